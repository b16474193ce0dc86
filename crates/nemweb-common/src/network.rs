//! Market networks published on NEMWEB
//!
//! AEMO timestamps are written in the network's local market time with no
//! offset marker. A network supplies that offset and the raw interval its
//! market data is settled at.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NemwebError;

/// A market network whose files are published on NEMWEB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Network {
    /// National Electricity Market (eastern states)
    Nem,
    /// Wholesale Electricity Market (Western Australia)
    Wem,
    /// AEMO rooftop PV estimates, published on the NEM clock
    AemoRooftop,
}

impl Network {
    pub fn code(self) -> &'static str {
        match self {
            Network::Nem => "NEM",
            Network::Wem => "WEM",
            Network::AemoRooftop => "AEMO_ROOFTOP",
        }
    }

    /// Offset from UTC in seconds. NEM market time ignores daylight saving.
    pub fn utc_offset_secs(self) -> i32 {
        match self {
            Network::Nem | Network::AemoRooftop => 10 * 3600,
            Network::Wem => 8 * 3600,
        }
    }

    pub fn timezone(self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs()).unwrap_or_else(|| Utc.fix())
    }

    /// Raw settlement interval of the network's market data
    pub fn interval(self) -> TimeDelta {
        match self {
            Network::Nem | Network::Wem => TimeDelta::minutes(5),
            Network::AemoRooftop => TimeDelta::minutes(30),
        }
    }

    /// Current wall-clock time in the network's market time
    pub fn now(self) -> NaiveDateTime {
        self.to_local(Utc::now())
    }

    /// Convert an instant into the network's naive market time
    pub fn to_local(self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.timezone()).naive_local()
    }

    /// Attach the network offset to a naive market timestamp
    pub fn localize(self, naive: NaiveDateTime) -> DateTime<FixedOffset> {
        self.timezone().from_utc_datetime(&(naive - TimeDelta::seconds(self.utc_offset_secs() as i64)))
    }
}

impl std::str::FromStr for Network {
    type Err = NemwebError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NEM" => Ok(Network::Nem),
            "WEM" => Ok(Network::Wem),
            "AEMO_ROOFTOP" | "ROOFTOP" => Ok(Network::AemoRooftop),
            _ => Err(NemwebError::UnknownNetwork(s.to_string())),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.code())
    }
}
