//! Precompiler configuration from `jspc.toml`.
//!
//! # Sections
//!
//! | Section        | Purpose                                         |
//! |----------------|-------------------------------------------------|
//! | `[app]`        | Application root, explicit pages, classpath     |
//! | `[compile]`    | Output, package, threads, failure policy        |
//! | `[descriptor]` | Servlet mapping output (mode, path, encoding)   |
//!
//! # Example
//!
//! ```toml
//! [app]
//! root = "src/main/webapp"
//!
//! [compile]
//! output = "target/jspc"
//! threads = "1.5C"
//! fail_fast = true
//!
//! [descriptor]
//! mode = "fragment"
//! path = "target/web-fragment.xml"
//! ```
//!
//! Relative paths in the file resolve against the file's directory,
//! relative paths on the command line against the working directory.

mod app;
mod compile;
pub mod defaults;
mod descriptor;
mod error;

pub use app::AppConfig;
pub use compile::CompileConfig;
pub use descriptor::DescriptorConfig;
pub use error::ConfigError;

use crate::{
    cli::Cli,
    descriptor::{DescriptorOutputSpec, resolve_encoding},
    error::JspcError,
    logger::Level,
    precompile::PrecompileOptions,
    resolver::split_classpath,
    scheduler::SchedulerConfig,
};
use anyhow::{Context, Result, bail};
use educe::Educe;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing jspc.toml
#[derive(Debug, Clone, Educe, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct JspcConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Verbosity, from the command line only
    #[serde(skip)]
    pub log_level: Level,

    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub compile: CompileConfig,

    #[serde(default)]
    pub descriptor: DescriptorConfig,
}

impl JspcConfig {
    /// Parse configuration from TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: JspcConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let mut config = Self::from_str(&content)?;

        config.config_path = Self::normalize_path(&Self::current_dir(), path);
        let base = config.config_path.parent().map(Path::to_path_buf).unwrap_or_default();
        config.update_path_with_base(&base);
        Ok(config)
    }

    /// Load the file named by `--config` when it exists, apply the
    /// command line on top and validate the result.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = if cli.config.exists() {
            Self::from_path(&cli.config)?
        } else {
            Self::default()
        };
        config.update_with_cli(cli);
        config.validate()?;
        Ok(config)
    }

    fn current_dir() -> PathBuf {
        std::env::current_dir().unwrap_or_default()
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let cwd = Self::current_dir();
        let normalize = |path: &PathBuf| Self::normalize_path(&cwd, path);

        self.log_level = cli.level();

        if let Some(root) = &cli.webapp {
            self.app.root = Some(normalize(root));
        }
        if !cli.pages.is_empty() {
            self.app.pages = cli.pages.iter().map(normalize).collect();
        }
        if let Some(classpath) = &cli.classpath {
            self.app.classpath = split_classpath(classpath).iter().map(normalize).collect();
        }

        if let Some(output) = &cli.output {
            self.compile.output = normalize(output);
        }
        if cli.package.is_some() {
            self.compile.package = cli.package.clone();
        }
        if cli.class_name.is_some() {
            self.compile.class_name = cli.class_name.clone();
        }
        Self::update_option(&mut self.compile.threads, cli.threads.as_ref());
        Self::update_option(&mut self.compile.failure_code, cli.die.as_ref());
        Self::update_option(&mut self.compile.command, cli.command.as_ref());
        Self::update_option(&mut self.compile.java_encoding, cli.java_encoding.as_ref());
        Self::update_option(&mut self.compile.source, cli.source.as_ref());
        Self::update_option(&mut self.compile.target, cli.target.as_ref());
        Self::update_option(&mut self.compile.uri_base, cli.uri_base.as_ref());
        self.compile.trim_spaces |= cli.trim_spaces;
        self.compile.x_powered_by |= cli.x_powered_by;
        self.compile.mapped |= cli.mapped;
        self.compile.fail_fast |= cli.fail_fast;
        self.compile.fail_on_error &= !cli.no_fail_on_error;
        self.compile.delete_sources |= cli.delete_sources;

        if let Some((mode, path)) = cli.descriptor() {
            self.descriptor.mode = Some(mode);
            self.descriptor.path = path.as_ref().map(normalize);
        }
        Self::update_option(&mut self.descriptor.encoding, cli.webxml_encoding.as_ref());
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Resolve every relative path in the file against its directory
    fn update_path_with_base(&mut self, base: &Path) {
        self.app.root = self.app.root.as_ref().map(|root| Self::normalize_path(base, root));
        self.app.pages = self.app.pages.iter().map(|page| Self::normalize_path(base, page)).collect();
        self.app.classpath = self.app.classpath.iter().map(|entry| Self::normalize_path(base, entry)).collect();
        self.compile.output = Self::normalize_path(base, &self.compile.output);
        self.descriptor.path = self.descriptor.path.as_ref().map(|path| Self::normalize_path(base, path));
    }

    /// Expand `~`, join onto `base` when relative, canonicalize when the path exists
    fn normalize_path(base: &Path, path: &Path) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());
        let path = if expanded.is_relative() { base.join(expanded) } else { expanded };
        path.canonicalize().unwrap_or(path)
    }

    /// Validate configuration before anything is compiled
    pub fn validate(&self) -> Result<()> {
        if self.compile.failure_code <= 0 {
            bail!(JspcError::config("[compile.failure_code] must be greater than zero"));
        }

        self.compile
            .threads
            .resolve()
            .context("[compile.threads] is invalid")?;
        self.compile.generation().validate().context("[compile] generation options are invalid")?;

        if let Some(root) = &self.app.root
            && !root.is_dir()
        {
            bail!(JspcError::config(format!(
                "[app.root] `{}` is not a directory",
                root.display()
            )));
        }

        for page in &self.app.pages {
            if !page.is_file() || fs::File::open(page).is_err() {
                bail!(JspcError::config(format!(
                    "Invalid JSP file `{}`",
                    page.display()
                )));
            }
        }

        resolve_encoding(&self.descriptor.encoding).context("[descriptor.encoding] is invalid")?;
        if let Some(spec) = self.descriptor_spec() {
            spec.validate()?;
        }

        Self::check_command_installed("[compile.command]", &self.compile.command)?;

        Ok(())
    }

    /// Check if a command is installed and available
    fn check_command_installed(field: &str, command: &[String]) -> Result<()> {
        let Some(cmd) = command.first() else {
            bail!(JspcError::config(format!("{field} must have at least one element")));
        };

        which::which(cmd).with_context(|| format!("`{cmd}` not found. Please install it first."))?;

        Ok(())
    }

    pub fn descriptor_spec(&self) -> Option<DescriptorOutputSpec> {
        self.descriptor.mode.map(|mode| {
            DescriptorOutputSpec::new(mode, self.descriptor.path.clone()).with_encoding(self.descriptor.encoding.clone())
        })
    }

    /// Build the options for one run, resolving the thread count.
    pub fn to_options(&self) -> Result<PrecompileOptions> {
        let mut options = PrecompileOptions::new(self.compile.output.clone());
        options.app_root = self.app.root.clone();
        options.pages = self.app.pages.clone();
        options.classpath = self.app.classpath.clone();
        options.package = self.compile.package.clone();
        options.generation = self.compile.generation();
        options.scheduler = SchedulerConfig {
            threads: self.compile.threads.resolve()?,
            fail_fast: self.compile.fail_fast,
            fail_on_error: self.compile.fail_on_error,
            class_name: self.compile.class_name.clone(),
            delete_sources: self.compile.delete_sources,
        };
        options.descriptor = self.descriptor_spec();
        options.failure_code = self.compile.failure_code;
        Ok(options)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{descriptor::OutputMode, scheduler::ThreadCount};
    use clap::Parser;
    use tempfile::TempDir;

    /// A command `which` always finds.
    fn installed_command() -> String {
        std::env::current_exe().unwrap().to_string_lossy().into_owned()
    }

    fn webapp() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("web/WEB-INF")).unwrap();
        fs::write(dir.path().join("web/index.jsp"), "<html/>").unwrap();
        dir
    }

    #[test]
    fn test_unknown_field_rejection() {
        assert!(JspcConfig::from_str("[compile]\nworkers = 4").is_err());
        assert!(JspcConfig::from_str("[server]\nport = 1").is_err());
    }

    #[test]
    fn test_paths_resolve_against_config_dir() {
        let dir = webapp();
        let path = dir.path().join("jspc.toml");
        fs::write(
            &path,
            r#"
            [app]
            root = "web"

            [compile]
            output = "out"

            [descriptor]
            mode = "full"
            path = "out/web.xml"
            "#,
        )
        .unwrap();

        let config = JspcConfig::from_path(&path).unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.app.root, Some(root.join("web")));
        assert_eq!(config.compile.output, root.join("out"));
        assert_eq!(config.descriptor.path, Some(root.join("out/web.xml")));
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = webapp();
        let path = dir.path().join("jspc.toml");
        fs::write(
            &path,
            r#"
            [compile]
            threads = 2
            fail_on_error = true

            [descriptor]
            mode = "full"
            path = "web.xml"
            "#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "jspc",
            "--threads",
            "x2",
            "--no-fail-on-error",
            "--fail-fast",
            "--die",
            "9",
            "--add-webxml-mappings",
            "--webxml-encoding",
            "ISO-8859-1",
            "--java-encoding",
            "windows-1252",
            "--source",
            "17",
            "--target",
            "21",
            "--trim-spaces",
            "--uri-base",
            "/shop/",
            "-s",
        ]);
        let mut config = JspcConfig::from_path(&path).unwrap();
        config.update_with_cli(&cli);

        assert_eq!(config.compile.threads, ThreadCount::PerCore(2.0));
        assert!(!config.compile.fail_on_error);
        assert!(config.compile.fail_fast);
        assert_eq!(config.compile.failure_code, 9);
        assert_eq!(config.descriptor.mode, Some(OutputMode::Merge));
        assert!(config.descriptor.path.is_none());
        assert_eq!(config.descriptor.encoding, "ISO-8859-1");
        assert_eq!(config.log_level, Level::Info);

        let generation = config.compile.generation();
        assert_eq!(generation.java_encoding, "windows-1252");
        assert_eq!((generation.source.as_str(), generation.target.as_str()), ("17", "21"));
        assert!(generation.trim_spaces);
        assert!(!generation.mapped && !generation.x_powered_by);
        assert_eq!(generation.uri_base, "/shop/");
    }

    #[test]
    fn test_validate() {
        let dir = webapp();
        let mut config = JspcConfig::default();
        config.app.root = Some(dir.path().join("web"));
        config.app.pages = vec![dir.path().join("web/index.jsp")];
        config.compile.command = vec![installed_command()];
        assert!(config.validate().is_ok());

        let expect_config_error = |config: &JspcConfig| {
            let err = config.validate().unwrap_err();
            assert!(
                matches!(err.downcast_ref::<JspcError>(), Some(JspcError::Configuration(_))),
                "unexpected error: {err:#}"
            );
        };

        let mut bad = config.clone();
        bad.compile.failure_code = 0;
        expect_config_error(&bad);

        let mut bad = config.clone();
        bad.app.root = Some(dir.path().join("missing"));
        expect_config_error(&bad);

        let mut bad = config.clone();
        bad.app.pages.push(dir.path().join("web/missing.jsp"));
        expect_config_error(&bad);

        let mut bad = config.clone();
        bad.descriptor.mode = Some(OutputMode::Fragment);
        expect_config_error(&bad);

        let mut bad = config.clone();
        bad.compile.command.clear();
        expect_config_error(&bad);

        let mut bad = config.clone();
        bad.compile.uri_base = "shop".into();
        expect_config_error(&bad);

        let mut bad = config.clone();
        bad.compile.target = String::new();
        expect_config_error(&bad);

        let mut bad = config.clone();
        bad.descriptor.encoding = "klingon".into();
        assert!(bad.validate().is_err());

        let mut bad = config;
        bad.compile.command = vec!["jspc-definitely-not-installed".into()];
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_to_options() {
        let dir = webapp();
        let mut config = JspcConfig::default();
        config.app.root = Some(dir.path().join("web"));
        config.compile.threads = ThreadCount::Absolute(3);
        config.compile.class_name = Some("Index".into());
        config.compile.fail_fast = true;
        config.compile.mapped = true;
        config.descriptor.mode = Some(OutputMode::Include);
        config.descriptor.path = Some(dir.path().join("inc.xml"));

        let options = config.to_options().unwrap();
        assert_eq!(options.app_root, config.app.root);
        assert_eq!(options.scheduler.threads, 3);
        assert!(options.scheduler.fail_fast);
        assert_eq!(options.scheduler.class_name.as_deref(), Some("Index"));
        assert_eq!(options.descriptor.unwrap().mode, OutputMode::Include);
        assert_eq!(options.failure_code, 1);
        assert!(options.generation.mapped);
        assert_eq!(options.generation.source, "1.8");
    }
}
