// Environment override tests. Kept to a single test so the process-wide
// environment is never mutated concurrently.

use std::env;

use varsend_viewer::{Config, ConnectionMode};

#[test]
fn test_env_overrides_apply_and_bad_values_are_ignored() {
    let mut config = Config::default();

    env::set_var("VARSEND_HOST", "0.0.0.0");
    env::set_var("VARSEND_PORT", "9200");
    env::set_var("VARSEND_MAX_BODY_SIZE", "4096");
    env::set_var("VARSEND_READ_TIMEOUT", "0");
    env::set_var("VARSEND_MULTI_FRAME", "true");
    env::set_var("VARSEND_STORE_CAPACITY", "not-a-number");

    config.apply_env_overrides();

    for key in [
        "VARSEND_HOST",
        "VARSEND_PORT",
        "VARSEND_MAX_BODY_SIZE",
        "VARSEND_READ_TIMEOUT",
        "VARSEND_MULTI_FRAME",
        "VARSEND_STORE_CAPACITY",
    ] {
        env::remove_var(key);
    }

    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 9200);
    assert_eq!(config.max_body_size, 4096);
    assert_eq!(config.read_timeout(), None);
    assert_eq!(config.connection_mode(), ConnectionMode::Stream);
    assert_eq!(config.store_capacity, Config::default().store_capacity);

    let limits = config.frame_limits().unwrap();
    assert_eq!(limits.max_body_size, 4096);
    assert_eq!(limits.read_timeout, None);
}
