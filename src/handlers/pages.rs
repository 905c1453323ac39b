use axum::response::Html;

static CONFIRMED_HTML: &str = include_str!("../web/modification-confirmed.html");
static REJECTED_HTML: &str = include_str!("../web/modification-rejected.html");

// GET /booking/modification-confirmed
pub async fn modification_confirmed() -> Html<&'static str> {
    Html(CONFIRMED_HTML)
}

// GET /booking/modification-rejected
pub async fn modification_rejected() -> Html<&'static str> {
    Html(REJECTED_HTML)
}
