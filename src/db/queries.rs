use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Booking, BookingStatus, BookingView, CatalogEntry, Client, ModificationProposal, Service,
    SyncStatus,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const LEGACY_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, LEGACY_TS_FORMAT))
        .map(|naive| naive.and_utc())
        .with_context(|| format!("invalid stored timestamp: {s}"))
}

fn parse_instant(s: &str) -> anyhow::Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).with_context(|| format!("invalid stored instant: {s}"))
}

// ── Clients ──

/// Phone matches win over email matches.
pub fn find_client(
    conn: &Connection,
    phone: &str,
    email: Option<&str>,
) -> anyhow::Result<Option<Client>> {
    let row = conn
        .query_row(
            "SELECT id, name, phone, email, created_at, updated_at FROM clients
             WHERE phone = ?1 OR (?2 IS NOT NULL AND email = ?2)
             ORDER BY (phone = ?1) DESC LIMIT 1",
            params![phone, email],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((id, name, phone, email, created_at, updated_at)) => Ok(Some(Client {
            id,
            name,
            phone,
            email,
            created_at: parse_ts(&created_at)?,
            updated_at: parse_ts(&updated_at)?,
        })),
        None => Ok(None),
    }
}

pub fn insert_client(conn: &Connection, client: &Client) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO clients (id, name, phone, email, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            client.id,
            client.name,
            client.phone,
            client.email,
            format_ts(&client.created_at),
            format_ts(&client.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_client_contact(
    conn: &Connection,
    id: &str,
    name: &str,
    email: Option<&str>,
    now: &DateTime<Utc>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE clients SET name = ?1, email = ?2, updated_at = ?3 WHERE id = ?4",
        params![name, email, format_ts(now), id],
    )?;
    Ok(())
}

// ── Services ──

pub fn ensure_service(conn: &Connection, entry: &CatalogEntry) -> anyhow::Result<Service> {
    conn.execute(
        "INSERT OR IGNORE INTO services (id, name, duration_minutes, price) VALUES (?1, ?2, ?3, ?4)",
        params![entry.id, entry.name, entry.duration_minutes, entry.price],
    )?;
    get_service(conn, entry.id)?.with_context(|| format!("service {} vanished", entry.id))
}

pub fn get_service(conn: &Connection, id: &str) -> anyhow::Result<Option<Service>> {
    let service = conn
        .query_row(
            "SELECT id, name, duration_minutes, price FROM services WHERE id = ?1",
            params![id],
            |row| {
                Ok(Service {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    duration_minutes: row.get(2)?,
                    price: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(service)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, client_id, service_id, date, time, notes, status, \
     google_calendar_id, last_sync_at, sync_status, created_at, updated_at";

const BOOKING_VIEW_SELECT: &str = "SELECT b.id, b.client_id, c.name, c.phone, c.email, \
     b.service_id, s.name, s.duration_minutes, s.price, b.date, b.time, b.notes, b.status, \
     b.google_calendar_id, b.last_sync_at, b.sync_status, b.created_at, b.updated_at \
     FROM bookings b \
     JOIN clients c ON c.id = b.client_id \
     JOIN services s ON s.id = b.service_id";

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        ),
        params![
            booking.id,
            booking.client_id,
            booking.service_id,
            booking.date.to_rfc3339(),
            booking.time,
            booking.notes,
            booking.status.as_str(),
            booking.google_calendar_id,
            booking.last_sync_at.as_ref().map(format_ts),
            booking.sync_status.as_str(),
            format_ts(&booking.created_at),
            format_ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_booking_view(conn: &Connection, id: &str) -> anyhow::Result<Option<BookingView>> {
    let result = conn.query_row(
        &format!("{BOOKING_VIEW_SELECT} WHERE b.id = ?1"),
        params![id],
        |row| Ok(parse_booking_view_row(row)),
    );

    match result {
        Ok(view) => Ok(Some(view?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_bookings(
    conn: &Connection,
    status_filter: Option<BookingStatus>,
    limit: i64,
) -> anyhow::Result<Vec<BookingView>> {
    let mut stmt = conn.prepare(&format!(
        "{BOOKING_VIEW_SELECT} WHERE (?1 IS NULL OR b.status = ?1) ORDER BY b.date DESC LIMIT ?2"
    ))?;

    let rows = stmt.query_map(
        params![status_filter.map(|s| s.as_str()), limit],
        |row| Ok(parse_booking_view_row(row)),
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Non-cancelled bookings starting in `[start, end)`.
pub fn get_bookings_in_range(
    conn: &Connection,
    start: &DateTime<FixedOffset>,
    end: &DateTime<FixedOffset>,
) -> anyhow::Result<Vec<BookingView>> {
    let mut stmt = conn.prepare(&format!(
        "{BOOKING_VIEW_SELECT} WHERE b.date >= ?1 AND b.date < ?2 AND b.status != 'cancelled' \
         ORDER BY b.date ASC"
    ))?;

    let rows = stmt.query_map(params![start.to_rfc3339(), end.to_rfc3339()], |row| {
        Ok(parse_booking_view_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Moves a `pending` booking to `confirmed`. Returns false when the booking
/// was not pending at write time.
pub fn confirm_if_pending(conn: &Connection, id: &str, now: &DateTime<Utc>) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = 'confirmed', updated_at = ?1 WHERE id = ?2 AND status = 'pending'",
        params![format_ts(now), id],
    )?;
    Ok(count > 0)
}

/// Cancels any booking not already cancelled and marks it out of sync.
pub fn cancel_if_active(conn: &Connection, id: &str, now: &DateTime<Utc>) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = 'cancelled', sync_status = 'out_of_sync', updated_at = ?1
         WHERE id = ?2 AND status != 'cancelled'",
        params![format_ts(now), id],
    )?;
    Ok(count > 0)
}

/// Writes every mutable field of `booking`. `date` and `time` always travel together.
pub fn save_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET date = ?1, time = ?2, notes = ?3, status = ?4, google_calendar_id = ?5,
           last_sync_at = ?6, sync_status = ?7, updated_at = ?8
         WHERE id = ?9",
        params![
            booking.date.to_rfc3339(),
            booking.time,
            booking.notes,
            booking.status.as_str(),
            booking.google_calendar_id,
            booking.last_sync_at.as_ref().map(format_ts),
            booking.sync_status.as_str(),
            format_ts(&booking.updated_at),
            booking.id,
        ],
    )?;
    Ok(count > 0)
}

/// Records the outcome of a calendar attempt. `last_sync_at` is kept when `None`.
pub fn record_sync(
    conn: &Connection,
    id: &str,
    google_calendar_id: Option<&str>,
    sync_status: SyncStatus,
    last_sync_at: Option<&DateTime<Utc>>,
    now: &DateTime<Utc>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE bookings SET google_calendar_id = ?1, sync_status = ?2,
           last_sync_at = COALESCE(?3, last_sync_at), updated_at = ?4
         WHERE id = ?5",
        params![
            google_calendar_id,
            sync_status.as_str(),
            last_sync_at.map(format_ts),
            format_ts(now),
            id,
        ],
    )?;
    Ok(())
}

pub fn delete_booking(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM bookings WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Bookings whose calendar state disagrees with the store.
pub fn bookings_needing_reconcile(conn: &Connection) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE (status = 'confirmed' AND sync_status IN ('failed', 'out_of_sync'))
            OR (status = 'cancelled' AND google_calendar_id IS NOT NULL)
         ORDER BY date ASC"
    ))?;

    let rows = stmt.query_map([], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Deletes cancelled bookings last touched strictly before `cutoff`.
pub fn delete_cancelled_before(conn: &Connection, cutoff: &DateTime<Utc>) -> anyhow::Result<usize> {
    let count = conn.execute(
        "DELETE FROM bookings WHERE status = 'cancelled' AND updated_at < ?1",
        params![format_ts(cutoff)],
    )?;
    Ok(count)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let date_str: String = row.get(3)?;
    let status_str: String = row.get(6)?;
    let last_sync_str: Option<String> = row.get(8)?;
    let sync_str: String = row.get(9)?;
    let created_at_str: String = row.get(10)?;
    let updated_at_str: String = row.get(11)?;

    Ok(Booking {
        id: row.get(0)?,
        client_id: row.get(1)?,
        service_id: row.get(2)?,
        date: parse_instant(&date_str)?,
        time: row.get(4)?,
        notes: row.get(5)?,
        status: BookingStatus::parse(&status_str)
            .with_context(|| format!("unknown booking status: {status_str}"))?,
        google_calendar_id: row.get(7)?,
        last_sync_at: last_sync_str.as_deref().map(parse_ts).transpose()?,
        sync_status: SyncStatus::parse(&sync_str),
        created_at: parse_ts(&created_at_str)?,
        updated_at: parse_ts(&updated_at_str)?,
    })
}

fn parse_booking_view_row(row: &rusqlite::Row) -> anyhow::Result<BookingView> {
    let date_str: String = row.get(9)?;
    let status_str: String = row.get(12)?;
    let last_sync_str: Option<String> = row.get(14)?;
    let sync_str: String = row.get(15)?;
    let created_at_str: String = row.get(16)?;
    let updated_at_str: String = row.get(17)?;

    Ok(BookingView {
        id: row.get(0)?,
        client_id: row.get(1)?,
        client_name: row.get(2)?,
        client_phone: row.get(3)?,
        client_email: row.get(4)?,
        service_id: row.get(5)?,
        service_name: row.get(6)?,
        duration_minutes: row.get(7)?,
        price: row.get(8)?,
        date: parse_instant(&date_str)?,
        time: row.get(10)?,
        notes: row.get(11)?,
        status: BookingStatus::parse(&status_str)
            .with_context(|| format!("unknown booking status: {status_str}"))?,
        google_calendar_id: row.get(13)?,
        last_sync_at: last_sync_str.as_deref().map(parse_ts).transpose()?,
        sync_status: SyncStatus::parse(&sync_str),
        created_at: parse_ts(&created_at_str)?,
        updated_at: parse_ts(&updated_at_str)?,
    })
}

// ── Modification proposals ──

pub fn insert_proposal(conn: &Connection, proposal: &ModificationProposal) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO modification_proposals
            (id, booking_id, date, time, expires_at, consumed_at, created_at, previous_status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            proposal.id,
            proposal.booking_id,
            proposal.date.to_rfc3339(),
            proposal.time,
            format_ts(&proposal.expires_at),
            proposal.consumed_at.as_ref().map(format_ts),
            format_ts(&proposal.created_at),
            proposal.previous_status.as_str(),
        ],
    )?;
    Ok(())
}

const PROPOSAL_COLUMNS: &str =
    "id, booking_id, date, time, expires_at, consumed_at, created_at, previous_status";

fn parse_proposal_row(row: &rusqlite::Row) -> anyhow::Result<ModificationProposal> {
    let date: String = row.get(2)?;
    let expires_at: String = row.get(4)?;
    let consumed_at: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;
    let previous_status: String = row.get(7)?;

    Ok(ModificationProposal {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        date: parse_instant(&date)?,
        time: row.get(3)?,
        expires_at: parse_ts(&expires_at)?,
        consumed_at: consumed_at.as_deref().map(parse_ts).transpose()?,
        created_at: parse_ts(&created_at)?,
        previous_status: BookingStatus::parse(&previous_status)
            .with_context(|| format!("invalid stored status: {previous_status}"))?,
    })
}

fn query_proposal(
    conn: &Connection,
    filter: &str,
    key: &str,
) -> anyhow::Result<Option<ModificationProposal>> {
    let sql = format!("SELECT {PROPOSAL_COLUMNS} FROM modification_proposals WHERE {filter}");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![key])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_proposal_row(row)?)),
        None => Ok(None),
    }
}

pub fn get_proposal(conn: &Connection, id: &str) -> anyhow::Result<Option<ModificationProposal>> {
    query_proposal(conn, "id = ?1", id)
}

/// Newest unconsumed proposal of a booking, if any.
pub fn open_proposal(conn: &Connection, booking_id: &str) -> anyhow::Result<Option<ModificationProposal>> {
    query_proposal(
        conn,
        "booking_id = ?1 AND consumed_at IS NULL ORDER BY created_at DESC LIMIT 1",
        booking_id,
    )
}

/// Single-use guard: only the first caller sees `true`.
pub fn consume_proposal(conn: &Connection, id: &str, now: &DateTime<Utc>) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE modification_proposals SET consumed_at = ?1 WHERE id = ?2 AND consumed_at IS NULL",
        params![format_ts(now), id],
    )?;
    Ok(count > 0)
}

/// Invalidates every open proposal of a booking, e.g. when a newer one supersedes it.
pub fn close_open_proposals(
    conn: &Connection,
    booking_id: &str,
    now: &DateTime<Utc>,
) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE modification_proposals SET consumed_at = ?1 WHERE booking_id = ?2 AND consumed_at IS NULL",
        params![format_ts(now), booking_id],
    )?;
    Ok(count)
}
