use crate::schema::LoungeConfig;

use super::helpers::validate_range;

pub(crate) fn validate_presence(errors: &mut Vec<String>, config: &LoungeConfig) {
    let p = &config.presence;
    validate_range(
        errors,
        "presence.typing_timeout_ms",
        p.typing_timeout_ms,
        500,
        60_000,
    );
    validate_range(errors, "presence.debounce_ms", p.debounce_ms, 50, 30_000);
    validate_range(
        errors,
        "presence.local_idle_ms",
        p.local_idle_ms,
        500,
        60_000,
    );
    // A sender that refreshes less often than the receiver TTL flickers.
    if p.debounce_ms >= p.typing_timeout_ms {
        errors.push(format!(
            "presence.debounce_ms = {} must be below typing_timeout_ms = {}",
            p.debounce_ms, p.typing_timeout_ms
        ));
    }
}
