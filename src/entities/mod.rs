// Entity Models - records kept per breeder
//
// Each entity module owns:
// - its row struct(s) and the enums stored in its columns
// - raw input structs (what a form or API client submits)
// - the queries that read and write it, scoped to the owning user

/// String-backed enum stored as TEXT and sent over the wire as lowercase text.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
        default $default:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl ::std::default::Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = ::std::string::String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => ::std::result::Result::Ok($name::$variant),)+
                    other => ::std::result::Result::Err(::std::format!("unknown {} '{}'", ::std::stringify!($name), other)),
                }
            }
        }

        impl ::rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> ::rusqlite::Result<::rusqlite::types::ToSqlOutput<'_>> {
                ::std::result::Result::Ok(::rusqlite::types::ToSqlOutput::from(self.as_str()))
            }
        }

        impl ::rusqlite::types::FromSql for $name {
            fn column_result(
                value: ::rusqlite::types::ValueRef<'_>,
            ) -> ::rusqlite::types::FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: ::std::string::String| ::rusqlite::types::FromSqlError::Other(e.into()))
            }
        }
    };
}

pub mod user;
pub mod pigeon;
pub mod bloodline;
pub mod color_tag;
pub mod pairing;
pub mod circuit;
pub mod sale;

pub use user::User;
pub use pigeon::{
    Gender, LegacyParent, Pigeon, PigeonFilter, PigeonInput, PigeonStatus, PigeonSummary,
    PigeonView,
};
pub use bloodline::{Bloodline, BloodlineChoice, BloodlineLink};
pub use color_tag::{ColorTag, ColorTagInput};
pub use pairing::{Clutch, ClutchInput, ClutchStatus, Pairing, PairingInput, PairingStatus};
pub use circuit::{Circuit, Organization, RaceResult, Season, SeasonRace};
pub use sale::{Sale, SaleInput, SaleStatus};

use crate::error::{LoftError, Result};
use serde::Serialize;

// ============================================================================
// PAGINATION
// ============================================================================

/// One page of a listing, newest first
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub last_page: u32,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: i64, page: u32, per_page: u32) -> Self {
        let last_page = ((total.max(0) as u32) + per_page - 1) / per_page.max(1);
        Page {
            data,
            total,
            page,
            per_page,
            last_page: last_page.max(1),
        }
    }

    /// Row offset for `page` (1-based)
    pub fn offset(page: u32, per_page: u32) -> i64 {
        (page.max(1) as i64 - 1) * per_page as i64
    }
}

// ============================================================================
// OWNERSHIP
// ============================================================================

/// Records whose foreign owners must be answered with 403
pub(crate) fn ensure_owner(record_owner: i64, owner: i64) -> Result<()> {
    if record_owner == owner {
        Ok(())
    } else {
        Err(LoftError::Forbidden)
    }
}
