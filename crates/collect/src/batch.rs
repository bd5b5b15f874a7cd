//! Reputation calculation script builder.
//!
//! Writes a script that drives the external `csb` toolchain over one NBS list
//! and one DCDB list, and can run it while streaming its output into the
//! status log.
//!
//! Each run gets its own directory,
//! `<root>/reputation_calcs/rep_calc_<MM_DD_YYYY_HHMM>_<id>/`, and every
//! intermediate file the toolchain writes carries the same `<id>`.

use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::NaiveDateTime;
use rand::Rng;
use tracing::{debug, info, warn};

use vbicompare_core::request::absolute_path;
use vbicompare_core::Severity;

use crate::error::{CollectError, Result};
use crate::reporter::Reporter;
use crate::settings::{ReputationSettings, ScriptFlavor};

/// Milestone closing the reputation stage.
pub const REQUESTED_COMPLETE: &str = "Requested process complete.";

/// Timestamp format of run directory and script names.
pub const RUN_STAMP_FORMAT: &str = "%m_%d_%Y_%H%M";

/// The two list files a reputation run reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInputs {
    pub nbs_list: PathBuf,
    pub dcdb_list: PathBuf,
}

/// A run directory and the names derived for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRun {
    pub run_dir: PathBuf,
    pub id: u32,
    pub stamp: String,
    pub script_path: PathBuf,
}

impl PreparedRun {
    pub fn database(&self) -> String {
        format!("rep_calc_{}.sqlite", self.id)
    }

    pub fn script_name(&self) -> String {
        self.script_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }
}

/// One argument of a `csb` command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// The run's database, through the script variable.
    Database,
    Text(String),
}

impl Arg {
    fn text(s: impl Into<String>) -> Self {
        Arg::Text(s.into())
    }
}

/// One `csb` invocation of the script.
#[derive(Debug, Clone, PartialEq)]
pub struct CalcStep {
    /// Echoed before the command runs.
    pub message: &'static str,
    /// Echoed, with the exit status, when the command fails.
    pub failure: &'static str,
    pub subcommand: &'static str,
    pub args: Vec<Arg>,
    /// Disabled steps are written commented out.
    pub enabled: bool,
}

/// Builds (and optionally runs) reputation scripts under one output root.
pub struct BatchBuilder {
    root: PathBuf,
    settings: ReputationSettings,
}

impl BatchBuilder {
    /// Relative paths (the root and the reputation input files) are made
    /// absolute against the working directory, since the script runs from
    /// its own run directory.
    pub fn new(root: impl Into<PathBuf>, mut settings: ReputationSettings) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            settings.resolve_paths(&cwd);
        }
        Self {
            root: absolute_path(&root.into()),
            settings,
        }
    }

    pub fn flavor(&self) -> ScriptFlavor {
        self.settings.flavor
    }

    /// Create the run directory for `id` at time `at`.
    pub fn prepare_at(&self, at: NaiveDateTime, id: u32) -> Result<PreparedRun> {
        let stamp = at.format(RUN_STAMP_FORMAT).to_string();
        let run_dir = self
            .root
            .join("reputation_calcs")
            .join(format!("rep_calc_{stamp}_{id}"));
        fs::create_dir_all(&run_dir)?;

        let script_path = run_dir.join(format!(
            "CSB_reputation_calc_{stamp}_{id}.{}",
            self.settings.flavor.extension()
        ));
        debug!(run_dir = %run_dir.display(), id, "prepared reputation run");

        Ok(PreparedRun {
            run_dir,
            id,
            stamp,
            script_path,
        })
    }

    /// Create a run directory for now with a random five-digit id.
    pub fn prepare(&self) -> Result<PreparedRun> {
        let id = rand::thread_rng().gen_range(20000..99999);
        self.prepare_at(chrono::Local::now().naive_local(), id)
    }

    /// The `csb` steps of a run, in order.
    pub fn steps(&self, run: &PreparedRun, inputs: &BatchInputs) -> Vec<CalcStep> {
        let id = run.id;
        let platforms = self.settings.platforms_file.display().to_string();
        let water_levels = self.settings.water_levels_file.display().to_string();
        let matched = format!("matched_obs_{id}.parquet");
        let biases = format!("biases_{id}.msgpack.bz2");
        let uncertainties = format!("uncertainties_{id}.msgpack.bz2");
        let reputation = format!("reputation_data_{id}.msgpack.bz2");
        let plot = run.run_dir.join(format!("rep_plot_{id}.png")).display().to_string();

        fn step(message: &'static str, failure: &'static str, subcommand: &'static str, args: Vec<Arg>) -> CalcStep {
            CalcStep {
                message,
                failure,
                subcommand,
                args,
                enabled: true,
            }
        }

        vec![
            step(
                "Creating sqlite database.",
                "Errors encountered during database creation.",
                "createdb",
                vec![Arg::text("-d"), Arg::Database],
            ),
            step(
                "Adding vessel data to database.",
                "Errors encountered while adding vessel data to database.",
                "loadplatf",
                vec![Arg::text("-d"), Arg::Database, Arg::text("-f"), Arg::text(&platforms)],
            ),
            step(
                "Adding CSB data to database.",
                "Errors encountered while adding CSB data to database.",
                "loadobscsv",
                vec![
                    Arg::text("-d"),
                    Arg::Database,
                    Arg::text("-r"),
                    Arg::text(self.list_ref(run, &inputs.dcdb_list)),
                ],
            ),
            step(
                "Adding authoritative data to database.",
                "Errors encountered while adding authoritative data to database.",
                "loadrefs",
                vec![
                    Arg::text("-d"),
                    Arg::Database,
                    Arg::text("-r"),
                    Arg::text(self.list_ref(run, &inputs.nbs_list)),
                ],
            ),
            step(
                "Matching CSB to authoritative data.",
                "Errors encountered during matchrefs.",
                "matchrefs",
                vec![Arg::text("-d"), Arg::Database],
            ),
            step(
                "Collecting matched observations.",
                "Errors encountered during matchobs.",
                "matchobs",
                vec![Arg::text("-d"), Arg::Database, Arg::text("-f"), Arg::text(&matched)],
            ),
            step(
                "Calculating CSB biases.",
                "Errors encountered while calculating biases.",
                "detbiases",
                vec![
                    Arg::text("-m"),
                    Arg::text(&matched),
                    Arg::text("-p"),
                    Arg::text(&platforms),
                    Arg::text("-w"),
                    Arg::text(&water_levels),
                    Arg::text("-o"),
                    Arg::text(&biases),
                    Arg::text("--required_depth_range"),
                    Arg::text(format!("{:.1}", self.settings.required_depth_range)),
                ],
            ),
            step(
                "Calculating uncertainties.",
                "Errors encountered while calculating uncertainties.",
                "detuncrt",
                vec![Arg::text("-d"), Arg::text(&biases), Arg::text("-o"), Arg::text(&uncertainties)],
            ),
            step(
                "Calculating reputation.",
                "Errors encountered while calculating reputation.",
                "detrep",
                vec![
                    Arg::text("-d"),
                    Arg::text(&biases),
                    Arg::text("-u"),
                    Arg::text(&uncertainties),
                    Arg::text("-o"),
                    Arg::text(&reputation),
                ],
            ),
            CalcStep {
                enabled: self.settings.include_plot,
                ..step(
                    "Creating data plots.",
                    "Errors encountered while creating data plots.",
                    "repplot",
                    vec![
                        Arg::text("-d"),
                        Arg::Database,
                        Arg::text("-r"),
                        Arg::text(&reputation),
                        Arg::text("-o"),
                        Arg::text(plot),
                    ],
                )
            },
        ]
    }

    /// A list file as the script sees it from the run directory.
    ///
    /// Lists in `<root>/<source>/` are referenced relatively, anything else
    /// by its full path.
    fn list_ref(&self, run: &PreparedRun, list: &Path) -> String {
        let list = absolute_path(list);
        let under_root = list
            .parent()
            .and_then(|source_dir| source_dir.parent().map(|root| (root, source_dir)))
            .filter(|(root, _)| *root == self.root.as_path())
            .and_then(|(_, source_dir)| source_dir.file_name());

        match (under_root, list.file_name()) {
            (Some(source), Some(file)) if run.run_dir.starts_with(&self.root) => format!(
                "../../{}/{}",
                source.to_string_lossy(),
                file.to_string_lossy()
            ),
            _ => list.display().to_string(),
        }
    }

    /// Script text for `run`.
    pub fn render(&self, run: &PreparedRun, inputs: &BatchInputs) -> String {
        let steps = self.steps(run, inputs);
        match self.settings.flavor {
            ScriptFlavor::Bat => render_bat(run, &steps, self.settings.activation_script.as_deref()),
            ScriptFlavor::Sh => render_sh(run, &steps, self.settings.activation_script.as_deref()),
        }
    }

    /// Write the script for `run`, executable on Unix.
    pub fn write(&self, run: &PreparedRun, inputs: &BatchInputs) -> Result<PathBuf> {
        fs::write(&run.script_path, self.render(run, inputs))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&run.script_path)?.permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&run.script_path, perms)?;
        }

        info!(script = %run.script_path.display(), "wrote reputation script");
        Ok(run.script_path.clone())
    }

    /// Prepare a run, write its script and, when `execute` is set, run it.
    pub fn build(&self, inputs: &BatchInputs, execute: bool, reporter: &mut Reporter) -> Result<PreparedRun> {
        reporter.calc_begin(if execute { 3 } else { 2 });
        let run = self.prepare()?;
        self.build_prepared(&run, inputs, execute, reporter)?;
        Ok(run)
    }

    /// [`build`](Self::build) for an already prepared run.
    ///
    /// Expects `calc_begin` to have been sent.
    pub fn build_prepared(
        &self,
        run: &PreparedRun,
        inputs: &BatchInputs,
        execute: bool,
        reporter: &mut Reporter,
    ) -> Result<()> {
        let dir = run.run_dir.display().to_string();
        reporter.info(format!("Reputation data path: {dir}"));
        reporter.calc_step_done();

        reporter.info("Building reputation calculation batch file.");
        for input in [&self.settings.platforms_file, &self.settings.water_levels_file] {
            if !input.exists() {
                warn!(path = %input.display(), "reputation input missing");
                reporter.warning(format!("Reputation input {} does not exist.", input.display()));
            }
        }
        self.write(run, inputs)?;
        reporter.calc_step_done();

        if !execute {
            reporter.calc_fill();
            reporter.success(format!("{} stored at {dir}.", run.script_name()));
            reporter.milestone(REQUESTED_COMPLETE);
            return Ok(());
        }

        reporter.success(format!("{} created at {dir}.", run.script_name()));
        reporter.info("Executing reputation calculation. This may take several minutes.");
        let exit = run_script(&run.script_path, &run.run_dir, self.settings.flavor, reporter)?;
        reporter.calc_fill();

        if exit.success() {
            reporter.milestone(format!("Calculation Complete. Files located at {dir}"));
        } else {
            reporter.error(format!("Calculation Failed: {}", exit.describe()));
        }
        reporter.milestone(REQUESTED_COMPLETE);
        Ok(())
    }
}

fn render_bat(run: &PreparedRun, steps: &[CalcStep], activation: Option<&Path>) -> String {
    let mut out = String::new();
    let mut line = |s: &str| {
        out.push_str(s);
        out.push_str("\r\n");
    };

    line("@echo off");
    line("set AWS_NO_SIGN_REQUEST=YES");
    line(&format!("set DB_Name={}", run.database()));
    if let Some(script) = activation {
        line(&format!("call \"{}\"", script.display()));
    }

    for (n, step) in steps.iter().enumerate() {
        let command = command_line(step, "%DB_Name%", bat_quote);
        if !step.enabled {
            line(&format!("REM call {command}"));
            continue;
        }
        line(&format!("echo {}", step.message));
        line(&format!("call {command}"));
        line(&format!("if %ERRORLEVEL% == 0 goto :next{n}"));
        line(&format!(
            "echo {}  Exited with status: %errorlevel%",
            step.failure
        ));
        line("goto :endofscript");
        line(&format!(":next{n}"));
    }

    line(":endofscript");
    line("echo Reputation Calculation Complete.");
    out
}

fn render_sh(run: &PreparedRun, steps: &[CalcStep], activation: Option<&Path>) -> String {
    let mut out = String::new();
    let mut line = |s: &str| {
        out.push_str(s);
        out.push('\n');
    };

    line("#!/bin/sh");
    line("export AWS_NO_SIGN_REQUEST=YES");
    line(&format!("DB_NAME={}", sh_quote(&run.database())));
    if let Some(script) = activation {
        line(&format!(". {}", sh_quote(&script.display().to_string())));
    }

    for step in steps {
        let command = command_line(step, "\"$DB_NAME\"", sh_quote);
        if !step.enabled {
            line(&format!("# {command}"));
            continue;
        }
        line("");
        line(&format!("echo {}", sh_quote(step.message)));
        line(&command);
        line("status=$?");
        line("if [ $status -ne 0 ]; then");
        line(&format!(
            "    echo \"{}  Exited with status: $status\"",
            step.failure
        ));
        line("    exit $status");
        line("fi");
    }

    line("");
    line("echo 'Reputation Calculation Complete.'");
    out
}

fn command_line(step: &CalcStep, database: &str, quote: fn(&str) -> String) -> String {
    let mut parts = vec!["csb".to_string(), step.subcommand.to_string()];
    parts.extend(step.args.iter().map(|arg| match arg {
        Arg::Database => database.to_string(),
        Arg::Text(s) => quote(s),
    }));
    parts.join(" ")
}

fn is_plain(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '\\' | '='))
}

fn sh_quote(s: &str) -> String {
    if is_plain(s) && !s.contains('\\') {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

fn bat_quote(s: &str) -> String {
    if is_plain(s) {
        s.to_string()
    } else {
        format!("\"{s}\"")
    }
}

/// How a script run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptExit {
    pub code: Option<i32>,
    pub stderr: String,
}

impl ScriptExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn describe(&self) -> String {
        let status = match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        };
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            status
        } else {
            format!("{status}: {stderr}")
        }
    }
}

/// Severity of one line of script output.
pub fn classify_line(line: &str) -> Severity {
    if line.starts_with("WARNING") {
        Severity::Warning
    } else if line.starts_with("ERROR") || line.starts_with("Errors") {
        Severity::Error
    } else {
        Severity::Info
    }
}

/// Run `script` in `run_dir`, reporting each line it prints.
///
/// Error lines are followed by a `Calculation Failed` line.
pub fn run_script(
    script: &Path,
    run_dir: &Path,
    flavor: ScriptFlavor,
    reporter: &Reporter,
) -> Result<ScriptExit> {
    let script = &absolute_path(script);
    let run_dir = &absolute_path(run_dir);
    let mut command = match flavor {
        ScriptFlavor::Bat => {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(script);
            c
        }
        ScriptFlavor::Sh => {
            let mut c = Command::new("sh");
            c.arg(script);
            c
        }
    };
    command
        .current_dir(run_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let script_err = |e: std::io::Error| CollectError::Script {
        script: script.to_path_buf(),
        reason: e.to_string(),
    };

    let mut child = command.spawn().map_err(script_err)?;
    debug!(script = %script.display(), pid = child.id(), "started reputation script");

    // stderr is drained on its own thread so a chatty script cannot block on it
    let stderr = child.stderr.take().map(|mut pipe| {
        std::thread::spawn(move || {
            let mut text = String::new();
            let _ = pipe.read_to_string(&mut text);
            text
        })
    });

    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines() {
            let line = line.map_err(script_err)?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            match classify_line(line) {
                Severity::Error => {
                    reporter.error(line);
                    reporter.error("Calculation Failed");
                }
                severity => reporter.status(severity, line),
            }
        }
    }

    let status = child.wait().map_err(script_err)?;
    let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
    debug!(script = %script.display(), ?status, "reputation script exited");

    Ok(ScriptExit {
        code: status.code(),
        stderr,
    })
}
