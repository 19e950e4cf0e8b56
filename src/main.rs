//! jspc - precompile the JSP pages of a web application.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use jspc::{
    CommandCompiler, Logger, Precompiler, cli::Cli, config::JspcConfig, scheduler::results::DEFAULT_FAILURE_CODE,
};

fn main() {
    let cli = Cli::parse();

    let code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            DEFAULT_FAILURE_CODE
        }
    };
    std::process::exit(code);
}

/// Load configuration, compile every page, and return the exit code.
fn run(cli: &Cli) -> Result<i32> {
    let config = JspcConfig::load(cli)?;
    let logger = Logger::new(config.log_level);

    let compiler = CommandCompiler::new(config.compile.command.clone(), logger.clone())?;
    let options = config.to_options()?;
    let report = Precompiler::new(options, Box::new(compiler), logger).execute()?;

    println!("{}", report.summary());
    Ok(report.exit_code())
}
