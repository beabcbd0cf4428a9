use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Classified intent of a piece of input text
///
/// The set is closed. Adding a label means adding a variant here and an entry
/// in the route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RouteLabel {
    #[default]
    Bitcoin,
    BitcoinPrice,
    Finance,
    Zipcode,
    MakeAnImageOf,
    Shitcoins,
    BitcoinCash,
    Bsv,
    CraigWrightSatoshi,
}

impl RouteLabel {
    pub const ALL: [RouteLabel; 9] = [
        RouteLabel::Bitcoin,
        RouteLabel::BitcoinPrice,
        RouteLabel::Finance,
        RouteLabel::Zipcode,
        RouteLabel::MakeAnImageOf,
        RouteLabel::Shitcoins,
        RouteLabel::BitcoinCash,
        RouteLabel::Bsv,
        RouteLabel::CraigWrightSatoshi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteLabel::Bitcoin => "bitcoin",
            RouteLabel::BitcoinPrice => "bitcoin_price",
            RouteLabel::Finance => "finance",
            RouteLabel::Zipcode => "zipcode",
            RouteLabel::MakeAnImageOf => "make_an_image_of",
            RouteLabel::Shitcoins => "shitcoins",
            RouteLabel::BitcoinCash => "bitcoin_cash",
            RouteLabel::Bsv => "bsv",
            RouteLabel::CraigWrightSatoshi => "craig_wright_satoshi",
        }
    }
}

impl fmt::Display for RouteLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unknown route label: {0}")]
pub struct UnknownRouteLabel(pub String);

impl FromStr for RouteLabel {
    type Err = UnknownRouteLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RouteLabel::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| UnknownRouteLabel(s.to_string()))
    }
}
