use std::boxed::Box;
use std::fs::{self, File};
use std::io::Write;
use std::ops::Deref;
use std::panic;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use fatal_issue_processor::enhance::CrashRecord;
use fatal_issue_processor::metrickit::DiagnosticPayload;
use fatal_issue_processor::storage::read_report;
use fatal_issue_processor::EventTypes;
use fatal_issue_reporter::{FatalIssueReporter, HostDirectories, ReporterOptions};

use clap::{AppSettings, Arg, ArgMatches, Command};
use log::error;
use simplelog::{
    ColorChoice, ConfigBuilder, Level, LevelFilter, TermLogger, TerminalMode, WriteLogger,
};

fn path_arg(name: &'static str) -> Arg<'static> {
    Arg::new(name).takes_value(true).allow_invalid_utf8(true)
}

fn make_app() -> Command<'static> {
    Command::new("fatal-issue-reporter")
        .version(clap::crate_version!())
        .about("Stages fatal issue reports for upload and inspects staged reports.")
        .next_line_help(true)
        .setting(AppSettings::DeriveDisplayOrder)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            path_arg("output-file")
                .long("output-file")
                .help("Where to write the output to (if unspecified, stdout is used)"),
        )
        .arg(
            path_arg("log-file")
                .long("log-file")
                .help("Where to write logs to (if unspecified, stderr is used)"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .possible_values(&["off", "error", "warn", "info", "debug", "trace"])
                .default_value("error")
                .takes_value(true)
                .help("Set the logging level."),
        )
        .subcommand(
            Command::new("process")
                .about("Stage the newest report a previous run left behind.")
                .long_about(
                    "Stage the newest report a previous run left behind.

Reads the directive at <sdk-root>/reports/config, copies the newest matching report into \
<sdk-root>/reports/new and prints the startup telemetry fields describing how that went.

Placeholders in the directive resolve to the current user's platform directories unless \
they are overridden.",
                )
                .arg(
                    path_arg("sdk-root")
                        .required(true)
                        .help("The SDK directory holding reports/config."),
                )
                .arg(path_arg("cache-dir").long("cache-dir").help("Value of {cache_dir}"))
                .arg(path_arg("files-dir").long("files-dir").help("Value of {files_dir}"))
                .arg(
                    path_arg("data-dir")
                        .long("data-dir")
                        .help("Value of {data_dir} and {support_dir}"),
                )
                .arg(
                    Arg::new("bundle-id")
                        .long("bundle-id")
                        .takes_value(true)
                        .default_value("")
                        .help("Value of {bundle_id}"),
                )
                .arg(
                    Arg::new("bundle-name")
                        .long("bundle-name")
                        .takes_value(true)
                        .default_value("")
                        .help("Value of {bundle_name}"),
                ),
        )
        .subcommand(
            Command::new("ingest")
                .about("Stage reports for the diagnostics in a MetricKit payload.")
                .arg(
                    path_arg("payload")
                        .required(true)
                        .help("Path to the MetricKit payload JSON."),
                )
                .arg(
                    path_arg("sdk-root")
                        .required(true)
                        .help("The SDK directory to stage reports under."),
                )
                .arg(
                    path_arg("crash-record")
                        .long("crash-record")
                        .help("An in-process crash record to name crash threads from."),
                )
                .arg(
                    Arg::new("event-types")
                        .long("event-types")
                        .takes_value(true)
                        .multiple_occurrences(true)
                        .possible_values(&["crash", "hang"])
                        .help("Only report these kinds of issue (default: all)"),
                )
                .arg(
                    Arg::new("minimum-hang-duration-ms")
                        .long("minimum-hang-duration-ms")
                        .takes_value(true)
                        .default_value("2500")
                        .help("Hangs shorter than this are not reported."),
                )
                .arg(
                    Arg::new("sdk-version")
                        .long("sdk-version")
                        .takes_value(true)
                        .help("The SDK version recorded in each report."),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Print a staged report.")
                .arg(path_arg("report").required(true).help("Path to the .cap report."))
                .arg(Arg::new("json").long("json").help("Emit JSON instead of text."))
                .arg(
                    Arg::new("pretty")
                        .long("pretty")
                        .help("Pretty-print --json output."),
                ),
        )
}

fn main() {
    let matches = make_app().get_matches();

    let output_file = matches
        .value_of_os("output-file")
        .map(|os_str| Path::new(os_str).to_owned());

    let log_file = matches
        .value_of_os("log-file")
        .map(|os_str| Path::new(os_str).to_owned());

    let verbosity = match matches.value_of("verbose") {
        Some("off") => LevelFilter::Off,
        Some("warn") => LevelFilter::Warn,
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Error,
    };

    let log_config = || {
        ConfigBuilder::new()
            .set_location_level(LevelFilter::Off)
            .set_time_level(LevelFilter::Off)
            .set_thread_level(LevelFilter::Off)
            .set_target_level(LevelFilter::Off)
            .set_level_color(Level::Trace, None)
            .build()
    };
    if let Some(log_path) = log_file {
        match File::create(&log_path) {
            Ok(log_file) => {
                let _ = WriteLogger::init(verbosity, log_config(), log_file);
            }
            Err(e) => {
                eprintln!("Couldn't create log file {}: {}", log_path.display(), e);
                std::process::exit(1);
            }
        }
    } else {
        let _ = TermLogger::init(
            verbosity,
            log_config(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        );
    }

    // Set a panic hook to redirect to the logger
    panic::set_hook(Box::new(|panic_info| {
        let (filename, line) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line()))
            .unwrap_or(("<unknown>", 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref)
            .unwrap_or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<&str>()
                    .copied()
                    .unwrap_or("<cause unknown>")
            });
        error!(
            "Panic - A panic occurred at {}:{}: {}",
            filename, line, cause
        );
    }));

    let mut stdout;
    let mut output_f;
    let output: &mut dyn Write = if let Some(output_path) = output_file {
        output_f = match File::create(&output_path) {
            Ok(f) => f,
            Err(e) => {
                error!("Couldn't create output file {}: {}", output_path.display(), e);
                std::process::exit(1);
            }
        };
        &mut output_f
    } else {
        stdout = std::io::stdout();
        &mut stdout
    };

    let result = match matches.subcommand() {
        Some(("process", sub)) => process(sub, output),
        Some(("ingest", sub)) => ingest(sub, output),
        Some(("inspect", sub)) => inspect(sub, output),
        _ => unreachable!("a subcommand is required"),
    };
    if let Err(e) = result {
        error!("Couldn't write output: {}", e);
        std::process::exit(1);
    }
}

fn os_path(matches: &ArgMatches, name: &str) -> Option<PathBuf> {
    matches.value_of_os(name).map(PathBuf::from)
}

fn process(matches: &ArgMatches, output: &mut dyn Write) -> std::io::Result<()> {
    let mut directories = HostDirectories::detect(
        matches.value_of("bundle-id").unwrap_or_default(),
        matches.value_of("bundle-name").unwrap_or_default(),
    );
    if let Some(dir) = os_path(matches, "cache-dir") {
        directories.cache_dir = dir;
    }
    if let Some(dir) = os_path(matches, "files-dir") {
        directories.files_dir = dir;
    }
    if let Some(dir) = os_path(matches, "data-dir") {
        directories.data_dir = dir;
    }

    let sdk_root = os_path(matches, "sdk-root").unwrap_or_default();
    let reporter = FatalIssueReporter::new(ReporterOptions::new(sdk_root, directories));
    let status = reporter.process_prior_reports();
    for (key, value) in status.fields() {
        writeln!(output, "{}: {}", key, value)?;
    }
    Ok(())
}

fn ingest(matches: &ArgMatches, output: &mut dyn Write) -> std::io::Result<()> {
    let payload_path = os_path(matches, "payload").unwrap_or_default();
    let payload = match fs::read(&payload_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Error reading payload {}: {}", payload_path.display(), e);
            std::process::exit(1);
        }
    };
    let payload = match DiagnosticPayload::from_slice(&payload) {
        Ok(payload) => payload,
        Err(err) => {
            error!("{} - Error parsing payload: {}", err.name(), err);
            std::process::exit(1);
        }
    };

    let crash_record = os_path(matches, "crash-record").map(|path| {
        match fs::read(&path).map(|bytes| CrashRecord::from_slice(&bytes)) {
            Ok(Ok(record)) => record,
            Ok(Err(err)) => {
                error!("{} - Error parsing crash record: {}", err.name(), err);
                std::process::exit(1);
            }
            Err(e) => {
                error!("Error reading crash record {}: {}", path.display(), e);
                std::process::exit(1);
            }
        }
    });

    let minimum_hang_duration = matches
        .value_of("minimum-hang-duration-ms")
        .and_then(|ms| u64::from_str(ms).ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| {
            error!("--minimum-hang-duration-ms must be a whole number of milliseconds");
            std::process::exit(1);
        });

    let sdk_root = os_path(matches, "sdk-root").unwrap_or_default();
    let mut options = ReporterOptions::new(sdk_root, HostDirectories::default());
    options.processor.minimum_hang_duration = minimum_hang_duration;
    if let Some(event_types) = matches.values_of("event-types") {
        options.processor.event_types = event_types
            .map(|event_type| match event_type {
                "hang" => EventTypes::HANG,
                _ => EventTypes::CRASH,
            })
            .collect();
    }
    if let Some(version) = matches.value_of("sdk-version") {
        options.metadata.sdk.version = version.to_owned();
    }

    let reporter = FatalIssueReporter::new(options);
    for path in reporter.stage_metrickit_payload(&payload, crash_record) {
        writeln!(output, "{}", path.display())?;
    }
    Ok(())
}

fn inspect(matches: &ArgMatches, mut output: &mut dyn Write) -> std::io::Result<()> {
    let json = matches.is_present("json");
    let pretty = matches.is_present("pretty");
    if pretty && !json {
        error!("The --pretty flag is only valid for --json output");
        std::process::exit(1);
    }

    let report_path = os_path(matches, "report").unwrap_or_default();
    let report = match read_report(&report_path) {
        Ok(report) => report,
        Err(err) => {
            error!("{} - Error reading report: {}", err.name(), err);
            std::process::exit(1);
        }
    };

    if json {
        report.print_json(&mut output, pretty)?;
        writeln!(output)
    } else {
        report.print(&mut output)
    }
}
