use dsfut::logging;

#[test]
fn logging_initialization_is_idempotent() {
    logging::init_logging().expect("first initialization succeeds");
    logging::init_logging().expect("subsequent initialization succeeds");
}

#[test]
fn log_event_accepts_errors_and_products() {
    logging::init_logging().expect("logging initializes");
    logging::log_event(
        file!(),
        "Test",
        "log_event",
        "test.log",
        line!(),
        "structured event",
        Some("boom"),
        Some(2020),
    );
}
