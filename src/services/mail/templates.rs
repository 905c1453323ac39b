use chrono::{DateTime, FixedOffset};

use super::{Attachment, Email};
use crate::models::BookingView;
use crate::services::calendar::ics::generate_ics;

fn display_date(date: &DateTime<FixedOffset>) -> String {
    date.format("%d.%m.%Y").to_string()
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn wrap_html(shop_name: &str, title: &str, inner: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>{title}</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #222;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2 style="color: #b8860b;">{title}</h2>
    {inner}
    <p style="color: #666; font-size: 13px; margin-top: 40px;">{shop}</p>
  </div>
</body>
</html>"#,
        title = escape_html(title),
        shop = escape_html(shop_name),
    )
}

fn details_html(booking: &BookingView) -> String {
    format!(
        "<p><strong>Serviciu:</strong> {}<br><strong>Data:</strong> {}<br><strong>Ora:</strong> {}</p>",
        escape_html(&booking.service_name),
        display_date(&booking.date),
        escape_html(&booking.time),
    )
}

fn details_text(booking: &BookingView) -> String {
    format!(
        "Serviciu: {}\nData: {}\nOra: {}",
        booking.service_name,
        display_date(&booking.date),
        booking.time
    )
}

/// Sent on create. `None` when the client left no email address.
pub fn booking_received(booking: &BookingView, shop_name: &str) -> Option<Email> {
    let to = booking.client_email.clone()?;
    let title = "Am primit cererea ta de programare";
    let intro = format!(
        "Salut {}, am primit cererea ta. Te anunțăm imediat ce o confirmăm.",
        booking.client_name
    );
    Some(Email {
        to,
        subject: format!("{title} - {shop_name}"),
        text: format!("{intro}\n\n{}\n\n{shop_name}", details_text(booking)),
        html: wrap_html(
            shop_name,
            title,
            &format!("<p>{}</p>{}", escape_html(&intro), details_html(booking)),
        ),
        attachment: None,
    })
}

pub fn booking_confirmed(booking: &BookingView, shop_name: &str) -> Option<Email> {
    let to = booking.client_email.clone()?;
    let title = "Programarea ta este confirmată";
    let intro = format!("Salut {}, te așteptăm!", booking.client_name);
    Some(Email {
        to,
        subject: format!("{title} - {shop_name}"),
        text: format!("{intro}\n\n{}\n\n{shop_name}", details_text(booking)),
        html: wrap_html(
            shop_name,
            title,
            &format!("<p>{}</p>{}", escape_html(&intro), details_html(booking)),
        ),
        attachment: Some(Attachment {
            filename: "programare.ics".to_string(),
            content_type: "text/calendar; charset=utf-8".to_string(),
            content: generate_ics(booking, shop_name),
        }),
    })
}

pub fn booking_cancelled(booking: &BookingView, shop_name: &str) -> Option<Email> {
    let to = booking.client_email.clone()?;
    let title = "Programarea ta a fost anulată";
    let intro = format!(
        "Salut {}, programarea de mai jos a fost anulată. Ne poți contacta pentru o nouă programare.",
        booking.client_name
    );
    Some(Email {
        to,
        subject: format!("{title} - {shop_name}"),
        text: format!("{intro}\n\n{}\n\n{shop_name}", details_text(booking)),
        html: wrap_html(
            shop_name,
            title,
            &format!("<p>{}</p>{}", escape_html(&intro), details_html(booking)),
        ),
        attachment: None,
    })
}

pub fn modification_proposal(
    booking: &BookingView,
    shop_name: &str,
    proposed: &DateTime<FixedOffset>,
    proposed_time: &str,
    confirm_url: &str,
    reject_url: &str,
) -> Option<Email> {
    let to = booking.client_email.clone()?;
    let title = "Propunere de modificare a programării";
    let intro = format!(
        "Salut {}, îți propunem o nouă dată pentru programarea ta: {} la ora {}.",
        booking.client_name,
        display_date(proposed),
        proposed_time
    );
    let text = format!(
        "{intro}\n\nProgramarea actuală:\n{}\n\nAccept: {confirm_url}\nRefuz (programarea va fi anulată): {reject_url}\n\n{shop_name}",
        details_text(booking)
    );
    let inner = format!(
        r#"<p>{intro}</p>
<p>Programarea actuală:</p>
{details}
<p style="margin: 30px 0;">
  <a href="{confirm}" style="display: inline-block; background-color: #15803d; color: white; padding: 12px 24px; text-decoration: none; border-radius: 4px;">Accept</a>
  <a href="{reject}" style="display: inline-block; background-color: #b91c1c; color: white; padding: 12px 24px; text-decoration: none; border-radius: 4px; margin-left: 12px;">Refuz</a>
</p>
<p style="color: #666; font-size: 13px;">Dacă refuzi, programarea va fi anulată.</p>"#,
        intro = escape_html(&intro),
        details = details_html(booking),
        confirm = escape_html(confirm_url),
        reject = escape_html(reject_url),
    );
    Some(Email {
        to,
        subject: format!("{title} - {shop_name}"),
        text,
        html: wrap_html(shop_name, title, &inner),
        attachment: None,
    })
}
