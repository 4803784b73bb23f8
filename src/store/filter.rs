//! Read-side event filters.

use std::str::FromStr;

use crate::store::event::{Event, EventKind};

/// Selection applied by [`EventStore::list`](crate::store::EventStore::list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventFilter {
    #[default]
    All,
    NetworkOnly,
    ErrorsOnly,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::NetworkOnly => event.kind() == EventKind::Network,
            EventFilter::ErrorsOnly => event.kind() == EventKind::Error,
        }
    }
}

/// Error returned when parsing an unknown filter name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event filter '{0}' (expected all, network or errors)")]
pub struct UnknownFilter(pub String);

impl FromStr for EventFilter {
    type Err = UnknownFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(EventFilter::All),
            "network" => Ok(EventFilter::NetworkOnly),
            "errors" | "error" => Ok(EventFilter::ErrorsOnly),
            _ => Err(UnknownFilter(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("all".parse::<EventFilter>().unwrap(), EventFilter::All);
        assert_eq!("Network".parse::<EventFilter>().unwrap(), EventFilter::NetworkOnly);
        assert_eq!("errors".parse::<EventFilter>().unwrap(), EventFilter::ErrorsOnly);
        assert!("warn".parse::<EventFilter>().is_err());
    }
}
