//! Piwik-shaped tables and row generators.

use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use purge_core::{MemoryStore, Row, Value};

/// Table prefix used by every fixture.
pub const PREFIX: &str = "piwik_";

pub const LOG_TABLES: [&str; 4] = [
    "piwik_log_visit",
    "piwik_log_link_visit_action",
    "piwik_log_conversion",
    "piwik_log_conversion_item",
];

pub const SITE_TABLES: [&str; 4] = ["piwik_goal", "piwik_site_url", "piwik_access", "piwik_site"];

pub const ARCHIVE_TABLES: [&str; 2] = [
    "piwik_archive_numeric_2013_01",
    "piwik_archive_blob_2013_01",
];

/// Create every table the purge touches, empty.
pub fn create_schema(store: &MemoryStore) {
    for table in LOG_TABLES.iter().chain(&SITE_TABLES).chain(&ARCHIVE_TABLES) {
        store.create_table(*table);
    }
}

/// A moment in 2013, the era of the fixtures.
pub fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2013, 1, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .unwrap()
}

/// Unix seconds for a local time, as `until` expects.
pub fn unix(time: NaiveDateTime) -> i64 {
    Local.from_local_datetime(&time).single().unwrap().timestamp()
}

pub fn visit(idvisit: u64, idsite: u32, last_action: NaiveDateTime) -> Row {
    Row::new()
        .with("idvisit", idvisit)
        .with("idsite", u64::from(idsite))
        .with("idvisitor", Value::Bytes(idvisit.to_be_bytes().to_vec()))
        .with("visit_last_action_time", last_action)
        .with("config_id", Value::Bytes(vec![0xde, 0xad, 0xbe, 0xef]))
        .with("location_ip", Value::Bytes(vec![10, 0, 0, (idvisit % 255) as u8]))
        .with("referer_name", "O'Reilly \\ Partners")
        .with("custom_var_k1", Value::Null)
}

pub fn action(idlink_va: u64, idvisit: u64, idsite: u32) -> Row {
    Row::new()
        .with("idlink_va", idlink_va)
        .with("idsite", u64::from(idsite))
        .with("idvisitor", Value::Bytes(idvisit.to_be_bytes().to_vec()))
        .with("idvisit", idvisit)
        .with("idaction_url", 42u64)
}

pub fn conversion(idvisit: u64, idsite: u32) -> Row {
    Row::new()
        .with("idvisit", idvisit)
        .with("idsite", u64::from(idsite))
        .with("idgoal", 1u64)
        .with("revenue", Value::Float(12.5))
}

pub fn conversion_item(idvisit: u64, idsite: u32, sku: &str) -> Row {
    Row::new()
        .with("idsite", u64::from(idsite))
        .with("idvisit", idvisit)
        .with("idorder", format!("order-{}", idvisit))
        .with("idaction_sku", sku)
}

/// Visits with their dependent rows.
#[derive(Debug, Clone)]
pub struct VisitSeed {
    pub site: u32,
    pub first_id: u64,
    pub count: u64,
    pub last_action: NaiveDateTime,
    pub actions_per_visit: u64,
    pub with_conversion: bool,
}

impl VisitSeed {
    pub fn new(site: u32, first_id: u64, count: u64, last_action: NaiveDateTime) -> Self {
        Self {
            site,
            first_id,
            count,
            last_action,
            actions_per_visit: 2,
            with_conversion: true,
        }
    }

    pub fn actions_per_visit(mut self, n: u64) -> Self {
        self.actions_per_visit = n;
        self
    }

    pub fn without_conversion(mut self) -> Self {
        self.with_conversion = false;
        self
    }

    pub fn ids(&self) -> std::ops::Range<u64> {
        self.first_id..self.first_id + self.count
    }

    pub fn insert_into(&self, store: &MemoryStore) {
        for idvisit in self.ids() {
            store.insert("piwik_log_visit", visit(idvisit, self.site, self.last_action));
            for n in 0..self.actions_per_visit {
                store.insert(
                    "piwik_log_link_visit_action",
                    action(idvisit * 1000 + n, idvisit, self.site),
                );
            }
            if self.with_conversion {
                store.insert("piwik_log_conversion", conversion(idvisit, self.site));
                store.insert(
                    "piwik_log_conversion_item",
                    conversion_item(idvisit, self.site, "SKU-1"),
                );
            }
        }
    }
}

/// Archive and configuration rows for one site.
pub fn seed_site_tables(store: &MemoryStore, idsite: u32) {
    let site = u64::from(idsite);
    store.insert(
        "piwik_site",
        Row::new().with("idsite", site).with("name", format!("Site {}", idsite)),
    );
    store.insert(
        "piwik_site_url",
        Row::new()
            .with("idsite", site)
            .with("url", format!("https://site{}.example.org", idsite)),
    );
    store.insert(
        "piwik_goal",
        Row::new().with("idsite", site).with("idgoal", 1u64).with("name", "Signup"),
    );
    store.insert(
        "piwik_access",
        Row::new().with("login", "admin").with("idsite", site).with("access", "admin"),
    );
    store.insert(
        "piwik_archive_numeric_2013_01",
        Row::new()
            .with("idarchive", site * 10)
            .with("idsite", site)
            .with("name", "nb_visits")
            .with("value", Value::Float(17.0)),
    );
    store.insert(
        "piwik_archive_blob_2013_01",
        Row::new()
            .with("idarchive", site * 10)
            .with("idsite", site)
            .with("name", "Referers_keywordBySearchEngine")
            .with("value", Value::Bytes(vec![0x78, 0x9c, 0x03, 0x00])),
    );
}
