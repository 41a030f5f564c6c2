//! Daily tick logs on disk: naming, reading, writing, querying and watching.

pub mod paths;
pub mod query;
pub mod reader;
pub mod watcher;
pub mod writer;

pub use paths::{
    log_file_for_ticker_and_date, log_files_for_date, parse_date, parse_log_file_name, today,
};
pub use query::{
    analyze_date, analyze_ticker_and_date, parse_date_or_today, parse_time_of_day,
    transactions_for_period, QueryError,
};
pub use reader::{read_incremental, read_log_file, read_tick_export, IncrementalRead};
pub use watcher::{Debouncer, FileChange, LogWatcher};
pub use writer::DailyLogWriter;
