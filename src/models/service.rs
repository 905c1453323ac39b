use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub duration_minutes: i64,
    /// Whole RON.
    pub price: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub duration_minutes: i64,
    pub price: i64,
}

pub const CATALOG: [CatalogEntry; 6] = [
    CatalogEntry { id: "tundere-clasica", name: "Tundere clasică", duration_minutes: 30, price: 50 },
    CatalogEntry { id: "tundere-barba", name: "Tundere + barbă", duration_minutes: 45, price: 80 },
    CatalogEntry { id: "aranjare-barba", name: "Aranjare barbă", duration_minutes: 20, price: 35 },
    CatalogEntry { id: "barbierit-traditional", name: "Bărbierit tradițional", duration_minutes: 30, price: 45 },
    CatalogEntry { id: "tundere-copii", name: "Tundere copii", duration_minutes: 30, price: 40 },
    CatalogEntry { id: "pachet-complet", name: "Pachet complet", duration_minutes: 60, price: 120 },
];

pub fn catalog_entry(id: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|entry| entry.id == id)
}

impl From<&CatalogEntry> for Service {
    fn from(entry: &CatalogEntry) -> Self {
        Service {
            id: entry.id.to_string(),
            name: entry.name.to_string(),
            duration_minutes: entry.duration_minutes,
            price: entry.price,
        }
    }
}
