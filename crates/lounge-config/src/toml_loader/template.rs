//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Lounge Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[realtime]
# project_ref = ""               # Supabase project reference
# api_key = ""                   # publishable anon key
# access_token = ""              # optional user JWT
# heartbeat_interval_secs = 25
# reconnect_delay_secs = 1
# max_reconnect_delay_secs = 30
# join_timeout_secs = 10

[presence]
# typing_timeout_ms = 3000       # remote typing indicator TTL
# debounce_ms = 1000             # must be below typing_timeout_ms
# local_idle_ms = 3000           # auto-stop after no keystrokes
# drop_stale_events = true

[store]
# rest_url = ""                  # defaults to https://<project_ref>.supabase.co/rest/v1
# request_timeout_secs = 10
#
# [[store.tables]]
# kind = "post_like"
# table = "likes"
# subject_column = "user_id"
# resource_column = "post_id"
# state_column = "active"
"##
    .to_string()
}
