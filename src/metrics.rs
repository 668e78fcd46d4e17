// ABOUTME: Counter helpers for bridge observability
// ABOUTME: Consumers install their own metrics exporter; this module only records

/// Record one inbound realtime frame.
pub fn record_frame() {
    metrics::counter!("bridge_frames_total").increment(1);
}

/// Record a frame dropped before dispatch.
pub fn record_dropped_frame(reason: &'static str) {
    metrics::counter!("bridge_dropped_frames_total", "reason" => reason).increment(1);
}

/// Record a dispatched command token.
pub fn record_command(token: &str) {
    metrics::counter!("bridge_commands_total", "command" => token.to_string()).increment(1);
}

/// Record a dispatched card action.
pub fn record_card_action() {
    metrics::counter!("bridge_card_actions_total").increment(1);
}

/// Record a supervisor restart.
pub fn record_restart() {
    metrics::counter!("bridge_restarts_total").increment(1);
}
