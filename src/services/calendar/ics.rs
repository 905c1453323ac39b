use chrono::Utc;

use crate::models::BookingView;

/// iCalendar attachment for a booking, times in UTC.
pub fn generate_ics(booking: &BookingView, shop_name: &str) -> String {
    let stamp = |dt: chrono::DateTime<Utc>| dt.format("%Y%m%dT%H%M%SZ").to_string();
    let dtstart = stamp(booking.date.with_timezone(&Utc));
    let dtend = stamp(booking.end().with_timezone(&Utc));
    let dtstamp = stamp(booking.updated_at);
    let uid = format!("{}@barbershop", booking.id);

    let summary = escape_text(&format!("{} - {}", booking.service_name, shop_name));
    let description = escape_text(booking.notes.as_deref().unwrap_or("Fără mențiuni"));

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Barbershop//Programari//RO\r\n\
         METHOD:PUBLISH\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}

fn escape_text(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace("\r\n", "\\n")
        .replace('\n', "\\n")
}
