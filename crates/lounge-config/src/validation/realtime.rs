use crate::schema::LoungeConfig;

use super::helpers::validate_range;

pub(crate) fn validate_realtime(errors: &mut Vec<String>, config: &LoungeConfig) {
    let rt = &config.realtime;
    validate_range(
        errors,
        "realtime.heartbeat_interval_secs",
        rt.heartbeat_interval_secs,
        5,
        60,
    );
    validate_range(
        errors,
        "realtime.reconnect_delay_secs",
        rt.reconnect_delay_secs,
        1,
        60,
    );
    validate_range(
        errors,
        "realtime.join_timeout_secs",
        rt.join_timeout_secs,
        1,
        120,
    );
    if rt.max_reconnect_delay_secs < rt.reconnect_delay_secs {
        errors.push(format!(
            "realtime.max_reconnect_delay_secs = {} is below reconnect_delay_secs = {}",
            rt.max_reconnect_delay_secs, rt.reconnect_delay_secs
        ));
    }
    if rt
        .project_ref
        .chars()
        .any(|c| !c.is_ascii_alphanumeric())
    {
        errors.push(format!(
            "realtime.project_ref = {:?} must be alphanumeric",
            rt.project_ref
        ));
    }
}
