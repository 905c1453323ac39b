use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub day: String,
    pub start: String,
    pub end: String,
}

/// Weekly opening hours of the shop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Availability {
    pub slots: Vec<TimeSlot>,
}

impl Availability {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let availability: Availability = serde_json::from_str(s)?;
        for slot in &availability.slots {
            parse_weekday(&slot.day)?;
            let start = parse_time(&slot.start)?;
            let end = parse_time(&slot.end)?;
            if end <= start {
                anyhow::bail!("slot ends before it starts: {}-{}", slot.start, slot.end);
            }
        }
        Ok(availability)
    }

    /// Opening windows for the weekday of `date`, earliest first.
    pub fn windows_for(&self, date: NaiveDate) -> Vec<(NaiveTime, NaiveTime)> {
        let weekday = date.weekday();
        let mut windows: Vec<(NaiveTime, NaiveTime)> = self
            .slots
            .iter()
            .filter(|slot| parse_weekday(&slot.day).ok() == Some(weekday))
            .filter_map(|slot| Some((parse_time(&slot.start).ok()?, parse_time(&slot.end).ok()?)))
            .collect();
        windows.sort();
        windows
    }

    pub fn to_human_readable(&self) -> String {
        if self.slots.is_empty() {
            return String::new();
        }

        let mut sorted_slots = self.slots.clone();
        sorted_slots.sort_by_key(|slot| {
            parse_weekday(&slot.day)
                .map(|d| d.num_days_from_monday())
                .unwrap_or(7)
        });

        sorted_slots
            .iter()
            .map(|s| {
                let day = capitalize(&s.day);
                format!("{day}: {}-{}", s.start, s.end)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + &c.as_str().to_lowercase(),
    }
}

fn parse_weekday(s: &str) -> anyhow::Result<Weekday> {
    match s.to_lowercase().as_str() {
        "mon" => Ok(Weekday::Mon),
        "tue" => Ok(Weekday::Tue),
        "wed" => Ok(Weekday::Wed),
        "thu" => Ok(Weekday::Thu),
        "fri" => Ok(Weekday::Fri),
        "sat" => Ok(Weekday::Sat),
        "sun" => Ok(Weekday::Sun),
        _ => Err(anyhow::anyhow!("invalid weekday: {s}")),
    }
}

fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| anyhow::anyhow!("invalid time: {s}"))
}
