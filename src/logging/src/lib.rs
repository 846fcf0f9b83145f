use log::info;

fn builder() -> env_logger::Builder {
    use chrono::Utc;
    use std::io::Write;

    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    builder.format(|buf, record| {
        let level_style = buf.default_level_style(record.level());
        writeln!(
            buf,
            "[{} {} {}:{}] {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S%.6f"),
            level_style.value(record.level()),
            record.file().unwrap_or("<unnamed>"),
            record.line().unwrap_or(0),
            &record.args()
        )
    });
    builder
}

/// Install the global logger. Panics if a logger is already installed.
pub fn init_log() {
    builder().init();
    info!("env_logger initialized");
}

/// Same as [`init_log`], but silently does nothing on repeated calls, so every test can call it.
pub fn try_init_log() {
    let _ = builder().is_test(true).try_init();
}
