use chrono::{DateTime, Duration, Utc};

use crate::model::ConnectionStatus;

/// Default recency window for the online badge.
pub const DEFAULT_ONLINE_WINDOW_SECS: i64 = 900;

/// A device counts as online iff its most recent reading is younger than
/// `online_window`. Power is a stored flag and plays no part here.
pub fn connection_status(
    last_reading_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    online_window: Duration,
) -> ConnectionStatus {
    match last_reading_at {
        Some(ts) if now.signed_duration_since(ts) <= online_window => ConnectionStatus::Online,
        _ => ConnectionStatus::Offline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Duration {
        Duration::seconds(DEFAULT_ONLINE_WINDOW_SECS)
    }

    #[test]
    fn recent_reading_is_online() {
        let now = Utc::now();
        let status = connection_status(Some(now - Duration::seconds(60)), now, window());
        assert_eq!(status, ConnectionStatus::Online);
    }

    #[test]
    fn stale_reading_is_offline() {
        let now = Utc::now();
        let status = connection_status(Some(now - Duration::hours(3)), now, window());
        assert_eq!(status, ConnectionStatus::Offline);
    }

    #[test]
    fn no_reading_is_offline() {
        assert_eq!(
            connection_status(None, Utc::now(), window()),
            ConnectionStatus::Offline
        );
    }

    #[test]
    fn reading_on_the_window_edge_is_online() {
        let now = Utc::now();
        let status = connection_status(Some(now - window()), now, window());
        assert_eq!(status, ConnectionStatus::Online);
    }

    #[test]
    fn future_timestamp_is_online() {
        // Telemetry clocks drift; a reading "from the future" still proves
        // the device is talking.
        let now = Utc::now();
        let status = connection_status(Some(now + Duration::seconds(30)), now, window());
        assert_eq!(status, ConnectionStatus::Online);
    }
}
