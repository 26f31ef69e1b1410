pub(super) const MIN_TICK_INTERVAL_SECS: u64 = 1;
pub(super) const MIN_RETENTION_HOURS: u64 = 1;

pub(super) fn default_tick_interval_secs() -> u64 {
    30
}

pub(super) fn default_retention_hours() -> u64 {
    72
}

pub(super) fn clamp_tick_interval_secs(value: u64) -> u64 {
    value.max(MIN_TICK_INTERVAL_SECS)
}

pub(super) fn clamp_retention_hours(value: u64) -> u64 {
    value.max(MIN_RETENTION_HOURS)
}
