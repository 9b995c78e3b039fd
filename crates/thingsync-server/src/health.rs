//! `/health` endpoint body.

use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    pub uptime_secs: u64,
    /// Joined WebSocket connections.
    pub connections: usize,
    /// Sessions issued since start.
    pub sessions: usize,
    /// Live items in the store.
    pub items: usize,
}

pub fn health_check(
    start_time: Instant,
    connections: usize,
    sessions: usize,
    items: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        sessions,
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_counters() {
        let resp = health_check(Instant::now(), 2, 5, 3);
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.connections, 2);
        assert_eq!(resp.sessions, 5);
        assert_eq!(resp.items, 3);
        assert!(resp.uptime_secs < 5);
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_value(health_check(Instant::now(), 0, 0, 0)).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].is_number());
        assert!(json["items"].is_number());
    }
}
