use log::LevelFilter;
use log4rs::{
    Config,
    append::{
        console::{ConsoleAppender, Target},
        rolling_file::RollingFileAppender,
        rolling_file::policy::compound::{
            CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
        },
    },
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
};

const LOG_SIZE_LIMIT: u64 = 10 * 1024 * 1024; // 10 MB
const LOG_ARCHIVE_COUNT: u32 = 3;

/// Console logging at `LOG_LEVEL` (default info) plus a debug-level file that
/// rolls into gzipped archives. Must run before anything logs.
pub fn init_logger() {
    let file_path = std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "server.log".to_string());
    let archive_pattern =
        std::env::var("LOG_ARCHIVE_PATTERN").unwrap_or_else(|_| "server.{}.log.gz".to_string());
    let console_level = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|v| v.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);

    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{h({l})} {m}\n")))
        .build();

    let policy = CompoundPolicy::new(
        Box::new(SizeTrigger::new(LOG_SIZE_LIMIT)),
        Box::new(
            FixedWindowRoller::builder()
                .build(&archive_pattern, LOG_ARCHIVE_COUNT)
                .expect("Invalid log archive pattern"),
        ),
    );
    let file = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {l} {t} - {m}\n",
        )))
        .build(file_path, Box::new(policy))
        .expect("Failed to open log file");

    let config = Config::builder()
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Debug)))
                .build("file", Box::new(file)),
        )
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(console_level)))
                .build("console", Box::new(console)),
        )
        .build(
            Root::builder()
                .appender("file")
                .appender("console")
                .build(LevelFilter::Trace),
        )
        .expect("Invalid logger configuration");

    log4rs::init_config(config).expect("Failed to initialize logger");
}
