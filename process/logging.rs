use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Result, Write as IoWrite},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    sync::{LazyLock, Mutex},
    thread,
};

use bon::Builder;
use chrono::Local;
use colored::{control::ShouldColorize, ColoredString, Colorize};
use log::{info, warn, Level, LevelFilter, Record};
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        rolling_file::{
            policy::compound::{
                roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy,
            },
            RollingFileAppender,
        },
    },
    config::{Appender, Root},
    encode::{pattern::PatternEncoder, Encode, Write},
    Config,
};
use nu_ansi_term::Color;
use private::Private;
use rand::Rng;

use crate::signal_handler::{add_pid, remove_pid};

mod private {
    pub trait Private {}
}

impl Private for Command {}

static LOG_DIR: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

#[derive(Debug, Clone)]
pub struct Logger {
    modules: Vec<(String, LevelFilter)>,
    level: LevelFilter,
    log_dir: Option<PathBuf>,
}

impl Logger {
    const TRIGGER_FILE_SIZE: u64 = 100 * 1024;
    const ARCHIVE_FILENAME_PATTERN: &'static str = "kaniko-plugin.{}.log";
    const LOG_FILENAME: &'static str = "kaniko-plugin.log";
    const LOG_FILE_COUNT: u32 = 4;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_modules<I, S>(&mut self, filter_modules: I) -> &mut Self
    where
        I: IntoIterator<Item = (S, LevelFilter)>,
        S: AsRef<str>,
    {
        self.modules = filter_modules
            .into_iter()
            .map(|(module, level)| (module.as_ref().to_string(), level))
            .collect::<Vec<_>>();
        self
    }

    pub const fn filter_level(&mut self, filter_level: LevelFilter) -> &mut Self {
        self.level = filter_level;
        self
    }

    /// Also write logs and executor output to files in this directory.
    pub fn log_out_dir<P>(&mut self, path: Option<P>) -> &mut Self
    where
        P: AsRef<Path>,
    {
        self.log_dir = path.map(|p| p.as_ref().to_path_buf());
        self
    }

    /// Initializes logging for the application.
    ///
    /// Logs always go to stderr. CI runners rarely attach a tty
    /// so the console appender is never restricted to one.
    ///
    /// # Panics
    /// Will panic if logging is unable to be initialized.
    pub fn init(&self) {
        let stderr = ConsoleAppender::builder()
            .encoder(Box::new(
                CustomPatternEncoder::builder()
                    .filter_modules(self.modules.clone())
                    .build(),
            ))
            .target(Target::Stderr)
            .build();

        let mut config =
            Config::builder().appender(Appender::builder().build("stderr", Box::new(stderr)));
        let mut root = Root::builder().appender("stderr");

        if let Some(log_dir) = self.log_dir.as_ref() {
            let log_out_path = log_dir.join(Self::LOG_FILENAME);
            let log_archive_pattern =
                format!("{}/{}", log_dir.display(), Self::ARCHIVE_FILENAME_PATTERN);

            let file_appender = FixedWindowRoller::builder()
                .build(&log_archive_pattern, Self::LOG_FILE_COUNT)
                .and_then(|window_roller| {
                    Ok(RollingFileAppender::builder()
                        .encoder(Box::new(PatternEncoder::new("{d} - {l} - {m}{n}")))
                        .build(
                            log_out_path,
                            Box::new(CompoundPolicy::new(
                                Box::new(SizeTrigger::new(Self::TRIGGER_FILE_SIZE)),
                                Box::new(window_roller),
                            )),
                        )?)
                });

            match file_appender {
                Err(e) => eprintln!("Cannot create logs directory:\n{e}"),
                Ok(file_appender) => {
                    root = root.appender("file");
                    config =
                        config.appender(Appender::builder().build("file", Box::new(file_appender)));

                    if let Ok(mut lock) = LOG_DIR.lock() {
                        *lock = Some(log_dir.clone());
                    }
                }
            }
        }

        let config = config
            .build(root.build(self.level))
            .expect("Logger config should build");

        log4rs::init_config(config).expect("Logger should initialize");
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            modules: vec![],
            level: LevelFilter::Info,
            log_dir: None,
        }
    }
}

trait ColoredLevel {
    fn colored(&self) -> ColoredString;
}

impl ColoredLevel for Level {
    fn colored(&self) -> ColoredString {
        match self {
            Self::Error => Self::Error.as_str().red(),
            Self::Warn => Self::Warn.as_str().yellow(),
            Self::Info => Self::Info.as_str().green(),
            Self::Debug => Self::Debug.as_str().blue(),
            Self::Trace => Self::Trace.as_str().cyan(),
        }
    }
}

pub trait CommandLogging: Private {
    /// Prints each line of stdout/stderr with a header built from
    /// the image ref. When a log directory is configured the raw
    /// output is also appended to a file named after the image.
    ///
    /// # Errors
    /// Will error if there was an issue executing the process.
    fn build_status<T, U>(self, image_ref: T, message: U) -> Result<ExitStatus>
    where
        T: AsRef<str>,
        U: AsRef<str>;
}

impl CommandLogging for Command {
    fn build_status<T, U>(self, image_ref: T, message: U) -> Result<ExitStatus>
    where
        T: AsRef<str>,
        U: AsRef<str>,
    {
        fn inner(mut command: Command, image_ref: &str, message: &str) -> Result<ExitStatus> {
            let ansi_color = gen_random_ansi_color();
            let name = color_str(image_ref, ansi_color);
            let short_name = color_str(shorten_name(image_ref), ansi_color);
            let (reader, writer) = os_pipe::pipe()?;

            command
                .stdout(writer.try_clone()?)
                .stderr(writer)
                .stdin(Stdio::null());

            info!("{message} {name}");

            let mut child = command.spawn()?;

            let child_pid = child.id();
            add_pid(child_pid);

            // The `Command` holds the write end of the pipe.
            // It has to be dropped or reading never ends.
            drop(command);

            let reader = BufReader::new(reader);
            let mut log_file = open_build_log(image_ref);

            let printer = thread::spawn(move || {
                reader.lines().map_while(Result::ok).for_each(|line| {
                    eprintln!("{log_prefix} {line}", log_prefix = log_header(&short_name));

                    if let Some((path, file)) = log_file.as_mut() {
                        if let Err(e) = writeln!(file, "{line}") {
                            warn!("Failed to write to build log {}: {e}", path.display());
                        }
                    }
                });
            });

            let status = child.wait()?;
            remove_pid(child_pid);

            if printer.join().is_err() {
                warn!("Output printer for {image_ref} panicked");
            }

            Ok(status)
        }
        inner(self, image_ref.as_ref(), message.as_ref())
    }
}

fn open_build_log(image_ref: &str) -> Option<(PathBuf, File)> {
    let log_dir = LOG_DIR.lock().ok()?.clone()?;
    let path = log_dir.join(format!("{}.log", image_ref.replace(['/', ':', '.'], "_")));

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .inspect_err(|e| warn!("Failed to open build log {}: {e}", path.display()))
        .ok()
        .map(|file| (path, file))
}

#[derive(Debug, Builder)]
struct CustomPatternEncoder {
    #[builder(default, into)]
    filter_modules: Vec<(String, LevelFilter)>,
}

impl Encode for CustomPatternEncoder {
    fn encode(&self, w: &mut dyn Write, record: &Record) -> anyhow::Result<()> {
        if record.module_path().is_some_and(|mp| {
            self.filter_modules
                .iter()
                .any(|(module, level)| mp.contains(module) && *level <= record.level())
        }) {
            return Ok(());
        }

        let header = match log::max_level() {
            LevelFilter::Off => return Ok(()),
            LevelFilter::Error | LevelFilter::Warn | LevelFilter::Info => {
                format!("{:5}", record.level().colored())
            }
            LevelFilter::Debug => format!("{:>5}", record.level().colored()),
            LevelFilter::Trace => format!(
                "{level:5} {module}:{line}",
                level = record.level().colored(),
                module = record.module_path().unwrap_or_default().bright_yellow(),
                line = record
                    .line()
                    .map_or_else(String::new, |l| l.to_string())
                    .bright_green(),
            ),
        };

        Ok(writeln!(
            w,
            "{prefix} {args}",
            prefix = log_header(header),
            args = record.args(),
        )?)
    }
}

/// Used to keep the style of logs consistent between
/// normal log use and command output.
fn log_header<T>(text: T) -> String
where
    T: AsRef<str>,
{
    fn inner(text: &str) -> String {
        match log::max_level() {
            LevelFilter::Error | LevelFilter::Warn | LevelFilter::Info => {
                format!("{text} {sep}", sep = "=>".bold())
            }
            LevelFilter::Debug | LevelFilter::Trace => format!(
                "[{time} {text}] {sep}",
                time = Local::now().format("%H:%M:%S"),
                sep = "=>".bold(),
            ),
            LevelFilter::Off => String::new(),
        }
    }
    inner(text.as_ref())
}

/// Shortens an image ref so the log header stays narrow.
/// Every path segment but the last is cut down to its initials.
///
/// # Examples
/// `gcr.io/my-project/app:1.2` -> `g.i/m/app:1.2`
/// `123.dkr.ecr.us-east-1.amazonaws.com/team/app` -> `1.d.e.u.a.c/t/app`
#[must_use]
fn shorten_name<T>(text: T) -> String
where
    T: AsRef<str>,
{
    let text = text.as_ref();

    let (path, tag) = match text.rsplit_once(':') {
        Some((path, tag)) if !tag.contains('/') => (path, Some(tag)),
        _ => (text, None),
    };

    let path_parts: Vec<&str> = path.split('/').collect();
    let last = path_parts.len().saturating_sub(1);

    let joined_path = path_parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            if i < last {
                part.split('.')
                    .filter_map(|p| p.chars().next())
                    .map(String::from)
                    .collect::<Vec<_>>()
                    .join(".")
            } else {
                (*part).to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/");

    match tag {
        Some(t) => format!("{joined_path}:{t}"),
        None => joined_path,
    }
}

#[must_use]
pub fn gen_random_ansi_color() -> u8 {
    // ANSI extended color range
    // https://www.ditig.com/publications/256-colors-cheat-sheet
    const LOW_END: u8 = 21; // Blue1 #0000ff rgb(0,0,255) hsl(240,100%,50%)
    const HIGH_END: u8 = 230; // Cornsilk1 #ffffd7 rgb(255,255,215) hsl(60,100%,92%)

    rand::rng().random_range(LOW_END..=HIGH_END)
}

pub fn color_str<T>(text: T, ansi_color: u8) -> String
where
    T: AsRef<str>,
{
    if ShouldColorize::from_env().should_colorize() {
        Color::Fixed(ansi_color)
            .paint(text.as_ref().to_string())
            .to_string()
    } else {
        text.as_ref().to_string()
    }
}
