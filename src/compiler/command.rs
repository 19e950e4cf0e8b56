//! Page compiler backed by an external command.
//!
//! The command is run once per page:
//!
//! ```text
//! <command...> --webapp <root> --uri /index.jsp --page <file> --output <dir>
//!              --classpath <a.jar:b.jar> --taglibs <dir>/.jspc/taglibs.json
//!              --java-encoding UTF-8 --source 1.8 --target 1.8 --uri-base /
//!              [--trim-spaces] [--x-powered-by] [--mapped]
//!              [--package org.example] [--class Index]
//! ```
//!
//! A zero exit status is a success. When the last non-empty stdout line is a
//! qualified name it is taken as the artifact name, otherwise the name is
//! derived from the page URI.

use super::{CompileContext, CompileRequest, PageCompiler, naming};
use crate::{error::CompileError, log, logger::Logger};
use anyhow::{Context, Result};
use regex::Regex;
use std::{
    borrow::Cow,
    ffi::OsString,
    fs,
    path::PathBuf,
    process::{Command, Output},
    sync::LazyLock,
};

/// Tag library index written once per run, relative to the output directory
pub const TAGLIB_INDEX: &str = ".jspc/taglibs.json";

static RE_ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());

/// Runs a configured command for every page.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    command: Vec<String>,
    logger: Logger,
}

impl CommandCompiler {
    pub fn new(command: Vec<String>, logger: Logger) -> Result<Self> {
        anyhow::ensure!(
            command.first().is_some_and(|c| !c.trim().is_empty()),
            "Empty page compiler command"
        );
        Ok(Self { command, logger })
    }

    fn taglib_index(context: &CompileContext) -> PathBuf {
        context.output_dir().join(TAGLIB_INDEX)
    }

    /// Arguments appended after the configured command.
    fn arguments(request: &CompileRequest<'_>) -> Vec<OsString> {
        let context = request.context;
        let generation = context.generation();
        let mut args: Vec<OsString> = vec![
            "--webapp".into(),
            context.app_root().into(),
            "--uri".into(),
            request.page.uri.as_str().into(),
            "--page".into(),
            request.page.path.as_os_str().into(),
            "--output".into(),
            context.output_dir().into(),
            "--classpath".into(),
            context.classpath().to_search_path(),
            "--taglibs".into(),
            Self::taglib_index(context).into(),
            "--java-encoding".into(),
            generation.java_encoding.as_str().into(),
            "--source".into(),
            generation.source.as_str().into(),
            "--target".into(),
            generation.target.as_str().into(),
            "--uri-base".into(),
            generation.uri_base.as_str().into(),
        ];
        for (flag, set) in [
            ("--trim-spaces", generation.trim_spaces),
            ("--x-powered-by", generation.x_powered_by),
            ("--mapped", generation.mapped),
        ] {
            if set {
                args.push(flag.into());
            }
        }
        if let Some(package) = context.package() {
            args.extend(["--package".into(), package.into()]);
        }
        if let Some(class_name) = request.class_name {
            args.extend(["--class".into(), class_name.into()]);
        }
        args
    }
}

impl PageCompiler for CommandCompiler {
    fn prepare(&self, context: &CompileContext) -> Result<()> {
        let index = Self::taglib_index(context);
        if let Some(parent) = index.parent() {
            fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_vec_pretty(context.taglibs())?;
        fs::write(&index, json).with_context(|| format!("Failed to write {}", index.display()))?;

        log!(self.logger, Debug; "compile"; "tag library index written to {}", index.display());
        Ok(())
    }

    fn compile(&self, request: &CompileRequest<'_>) -> Result<String, CompileError> {
        let (name, mut command) = prepare(&self.command, &Self::arguments(request))?;
        command.current_dir(request.context.app_root());

        log!(self.logger, Trace; "compile"; "running {:?}", command);

        let output = command.output().map_err(|source| CompileError::Launch {
            command: name.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(CompileError::Exit {
                command: name,
                status: output.status,
                output: format_output(&output),
            });
        }

        // on success only stderr is worth showing (warnings)
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = strip_ansi(stderr.trim());
        if !stderr.is_empty() {
            log!(self.logger, Debug; "compile"; "{}: {}", request.page.uri, stderr);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(reported_artifact(&stdout).unwrap_or_else(|| request.default_artifact()))
    }
}

/// Prepare a Command from components.
fn prepare(cmd: &[String], args: &[OsString]) -> Result<(String, Command)> {
    let (program, fixed) = cmd.split_first().context("Empty command")?;

    let mut command = Command::new(program);
    command.args(fixed).args(args);

    Ok((program.clone(), command))
}

/// Artifact name from the last non-empty stdout line, if it is one.
fn reported_artifact(stdout: &str) -> Option<String> {
    let last = stdout.lines().map(str::trim).rfind(|line| !line.is_empty())?;
    let last = strip_ansi(last);
    naming::is_qualified_name(&last).then(|| last.into_owned())
}

fn strip_ansi(s: &str) -> Cow<'_, str> {
    RE_ANSI_ESCAPE.replace_all(s, "")
}

/// Combined stderr and stdout of a failed run.
fn format_output(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let mut msg = strip_ansi(stderr.trim()).into_owned();
    let stdout = strip_ansi(stdout.trim());
    if !stdout.is_empty() {
        if !msg.is_empty() {
            msg.push('\n');
        }
        msg.push_str("Stdout:\n");
        msg.push_str(&stdout);
    }
    msg
}
