//! apicheck CLI - fixture tools, schema checks and ad-hoc endpoint calls

mod report;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use apicheck_core::http::{Body, Method};
use apicheck_core::schemagen::infer_schema_from;
use apicheck_core::sort::{MatchPolicy, SortRules};
use apicheck_core::transcode::{self, ConvertOptions, Enrichment, Format, Selection};
use apicheck_core::{Config, DbProfile, ExtDict, FileRegistry, Node, Transcript};
use apicheck_runner::{
    ApiEndpoint, CallArgs, DispatchError, Dispatcher, ReqwestTransport, RetryPolicy, SchemaCheckError, SchemaValidator,
    TransportSettings, conforms_to,
};

const LOG_ENV: &str = "APICHECK_LOG";
const DEFAULT_UNSORTED_PAIRS: &str = "type:object,type:array";
const DEFAULT_NEW_DATA: &str = "type:object;additionalProperties:false,type:array;uniqueItems:true";

#[derive(Parser)]
#[command(name = "apicheck")]
#[command(about = "API test automation helpers: fixtures, schemas and endpoint calls")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: .apicheck.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging on stderr (overrides APICHECK_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert fixture files between JSON and YAML, renaming references
    Convert(ConvertArgs),

    /// Sort a JSON or YAML document
    Sort {
        file: PathBuf,

        #[command(flatten)]
        rules: SortArgs,

        /// Rewrite the file instead of printing the result
        #[arg(long)]
        in_place: bool,
    },

    /// Generate a JSON schema from sample documents
    InferSchema {
        /// Sample documents (JSON or YAML)
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,

        /// Output format: json or yml
        #[arg(short, long, default_value = "yml", value_parser = parse_format)]
        format: Format,
    },

    /// Rewrite quoted snake_case keys as camelCase
    Camelize {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Validate a document against a registered schema
    Validate {
        document: PathBuf,

        /// Schema file name, e.g. user.json
        #[arg(long)]
        schema: String,

        /// Project root holding tests/ and global_jsonschema/
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Send one request and check the response
    Call(CallCommand),

    /// Initialize config file
    Init,

    /// Show version and check the project layout
    Doctor,

    /// Export JSON Schema for persisted transcripts
    Schema,
}

#[derive(Args)]
struct SortArgs {
    /// Comma-separated items; containers holding one stay unsorted
    #[arg(long)]
    unsorted_items: Option<String>,

    /// Comma-separated key:value pairs; mappings holding one stay unsorted
    #[arg(long, default_value = DEFAULT_UNSORTED_PAIRS)]
    unsorted_pairs: String,

    /// Keep a container unsorted only when every marker matches
    #[arg(long)]
    exclude_all_from_sorting: bool,

    /// Descending order
    #[arg(long)]
    reverse: bool,
}

impl SortArgs {
    fn rules(&self) -> Result<SortRules> {
        let items = self
            .unsorted_items
            .as_deref()
            .map(SortRules::parse_items)
            .unwrap_or_default();
        let policy = if self.exclude_all_from_sorting {
            MatchPolicy::All
        } else {
            MatchPolicy::Any
        };
        Ok(SortRules::new()
            .with_items(items)
            .with_pairs(SortRules::parse_pairs(&self.unsorted_pairs)?)
            .with_policy(policy)
            .reversed(self.reverse))
    }
}

#[derive(Args)]
struct ConvertArgs {
    /// Root directory inside which all changes are made
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Directories with this name are converted
    #[arg(short = 's', long, default_value = "schema")]
    schemadir: String,

    /// Comma-separated file names; only these are converted
    #[arg(short, long)]
    files: Option<String>,

    #[arg(short, long, default_value = "json", value_parser = parse_format)]
    input_type: Format,

    #[arg(short, long, default_value = "yml", value_parser = parse_format)]
    output_type: Format,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Print affected files, change nothing
    #[arg(short, long)]
    emulate: bool,

    /// Sort mapping keys and sequences
    #[arg(long)]
    sort: bool,

    #[command(flatten)]
    rules: SortArgs,

    /// Keep source files
    #[arg(short, long)]
    preserve: bool,

    /// Add the --new-data pairs
    #[arg(long)]
    enrich: bool,

    /// Comma-separated 'search_key:search_value;key:value' entries
    #[arg(long, default_value = DEFAULT_NEW_DATA)]
    new_data: String,

    /// Keep values after the colon as strings
    #[arg(long)]
    no_normalize: bool,
}

#[derive(Args)]
struct CallCommand {
    method: String,

    /// Base URL, e.g. https://api.example.com
    url: String,

    /// Path template, e.g. /users/{id}
    path: String,

    /// Path values in template order
    #[arg(long = "arg")]
    args: Vec<String>,

    /// Header as 'Name: value'
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Query parameter as key=value
    #[arg(long = "param")]
    params: Vec<String>,

    /// Cookie as key=value
    #[arg(long = "cookie")]
    cookies: Vec<String>,

    /// Request body; '@file' reads it from a file
    #[arg(long)]
    body: Option<String>,

    /// Follow redirects
    #[arg(long)]
    follow: bool,

    /// Fail unless the final status matches
    #[arg(long)]
    expect_status: Option<u16>,

    /// Validate the response body against this schema file
    #[arg(long)]
    schema: Option<String>,

    /// Comma-separated transient statuses to retry (default from config)
    #[arg(long, value_delimiter = ',')]
    retry_status: Option<Vec<u16>>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Write the transcript and an .http replay file to this directory
    #[arg(long)]
    dump: Option<PathBuf>,
}

fn parse_format(value: &str) -> Result<Format, String> {
    Format::from_name(value).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(3)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.apply_env();
    Ok(config)
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Convert(args) => convert(&args),

        Commands::Sort { file, rules, in_place } => {
            let value = transcode::load(&file)?;
            let sorted = transcode::sort_value(&value, &rules.rules()?)?;
            let format = Format::from_path(&file).unwrap_or(Format::Json);
            if in_place {
                transcode::dump(&sorted, &file, format)?;
                eprintln!("Sorted {}", file.display());
            } else {
                print!("{}", format.render(&sorted)?);
            }
            Ok(0)
        }

        Commands::InferSchema { input, output, format } => {
            let samples = input
                .iter()
                .map(|path| transcode::load(path))
                .collect::<Result<Vec<_>, _>>()?;
            let schema = infer_schema_from(&samples);
            transcode::dump(&schema, &output, format)?;
            println!("Schema from {} sample(s) written to {}", samples.len(), output.display());
            Ok(0)
        }

        Commands::Camelize { input, output } => {
            let text = std::fs::read_to_string(&input).with_context(|| format!("read {}", input.display()))?;
            std::fs::write(&output, transcode::camelize(&text)?).with_context(|| format!("write {}", output.display()))?;
            println!("Written {}", output.display());
            Ok(0)
        }

        Commands::Validate { document, schema, root } => {
            let root = match root {
                Some(root) => root,
                None => load_config(cli.config.as_deref())?.project_root(),
            };
            let registry = FileRegistry::discover(&root)?;
            let (schema_path, schema_value) = registry.load_schema(&schema)?;
            let value = transcode::load(&document)?;

            let errors = SchemaValidator::new().validate(&value, &schema_value, Some(&schema_path))?;
            if errors.is_empty() {
                println!("PASS: {} conforms to {}", document.display(), schema_path.display());
                return Ok(0);
            }
            println!("FAIL: {} does not conform to {}", document.display(), schema_path.display());
            for error in &errors {
                println!("  - {error}");
            }
            Ok(1)
        }

        Commands::Call(call) => {
            let config = load_config(cli.config.as_deref())?;
            call_endpoint(&config, call)
        }

        Commands::Init => {
            let config_path = ".apicheck.toml";
            if Path::new(config_path).exists() {
                eprintln!("{config_path} already exists");
                return Ok(1);
            }

            std::fs::write(config_path, Config::example())?;
            println!("Created {config_path}");
            println!("\nEdit the file to configure:");
            println!("  - environment: which service and database entries to use");
            println!("  - services: base URLs and default headers per environment");
            println!("  - databases: SQLite files per environment");
            Ok(0)
        }

        Commands::Doctor => doctor(cli.config.as_deref()),

        Commands::Schema => {
            let schema = apicheck_core::schema::generate_schema()?;
            println!("{schema}");
            Ok(0)
        }
    }
}

fn convert(args: &ConvertArgs) -> Result<u8> {
    let names = args
        .files
        .as_deref()
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let selection = Selection {
        dir_name: args.schemadir.clone(),
        format: args.input_type,
        names,
        recursive: args.recursive,
    };

    let mut options = ConvertOptions::new(args.output_type)
        .preserving(args.preserve)
        .emulating(args.emulate);
    if args.sort {
        options = options.with_sort(args.rules.rules()?);
    }
    if args.enrich {
        options = options.with_enrichment(Enrichment::parse_list(&args.new_data, !args.no_normalize)?);
    }

    let files = transcode::collect_files(&args.root, &selection)?;
    if files.is_empty() {
        eprintln!("No {:?} files under {}", args.input_type, args.root.display());
        return Ok(0);
    }

    for source in &files {
        let destination = transcode::convert_file(source, &options)?;
        println!("{} -> {}", source.display(), destination.display());

        let (Some(old), Some(new)) = (source.file_name(), destination.file_name()) else {
            continue;
        };
        if old != new {
            let touched =
                transcode::rewrite_references(&args.root, &old.to_string_lossy(), &new.to_string_lossy(), args.emulate)?;
            for path in touched {
                println!("  reference updated: {}", path.display());
            }
        }
    }
    Ok(0)
}

fn split_pair<'a>(text: &'a str, separator: char, what: &str) -> Result<(&'a str, &'a str)> {
    match text.split_once(separator) {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value.trim())),
        _ => bail!("{what} '{text}' is not of the form key{separator}value"),
    }
}

fn pairs_to_dict(entries: &[String], separator: char, what: &str) -> Result<ExtDict> {
    let mut dict = ExtDict::new();
    for entry in entries {
        let (key, value) = split_pair(entry, separator, what)?;
        dict.insert(key, value);
    }
    Ok(dict)
}

fn read_body(text: &str) -> Result<(Body, bool)> {
    let raw = match text.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("read body from {path}"))?,
        None => text.to_string(),
    };
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(value) => Ok((Body::from(Node::try_from(value)?), true)),
        Err(_) => Ok((Body::from(raw), false)),
    }
}

fn call_endpoint(config: &Config, call: CallCommand) -> Result<u8> {
    let method: Method = call.method.parse()?;
    let mut headers = pairs_to_dict(&call.headers, ':', "header")?;

    let mut args = CallArgs::new().allow_redirects(call.follow);
    for value in &call.args {
        args = args.arg(value);
    }
    if !call.params.is_empty() {
        args = args.with_params(pairs_to_dict(&call.params, '=', "parameter")?);
    }
    if !call.cookies.is_empty() {
        args = args.with_cookies(pairs_to_dict(&call.cookies, '=', "cookie")?);
    }
    if let Some(text) = &call.body {
        let (body, is_json) = read_body(text)?;
        let has_content_type = headers.keys().any(|k| k.eq_ignore_ascii_case("content-type"));
        if is_json && !has_content_type {
            headers.insert("Content-Type", "application/json");
        }
        args = args.with_body(body);
    }

    let endpoint = ApiEndpoint::new(call.url.clone(), method, &call.path)?.with_headers(headers);

    let mut settings = TransportSettings::from_config(config);
    if let Some(secs) = call.timeout {
        settings.timeout = Duration::from_secs(secs);
    }
    let mut policy = RetryPolicy::from_settings(&config.retry);
    if let Some(statuses) = call.retry_status {
        policy.transient = statuses;
    }
    let transcript = Transcript::from_config(config);
    let dispatcher = Dispatcher::new(ReqwestTransport::new(&settings)?)
        .with_policy(policy)
        .with_transcript(transcript.clone());

    let request = endpoint.build_request(&args)?;
    eprintln!("{request}");

    let outcome = dispatcher.send(&request, None);
    if let Some(dir) = &call.dump {
        let saved = report::save(&transcript, "call", dir, &call.url, config)?;
        eprintln!(
            "Dump: {} record(s) -> {} (replay: {})",
            saved.index.total,
            dir.display(),
            saved.http_file.display()
        );
    }

    let response = match outcome {
        Ok(response) => response,
        Err(err @ DispatchError::Exhausted { .. }) => {
            println!("FAIL: {err}");
            return Ok(1);
        }
        Err(err) => return Err(err.into()),
    };
    println!("{response}");

    let mut failed = false;
    if let Some(expected) = call.expect_status {
        if let Err(err) = response.status_eq(expected) {
            println!("FAIL: expected status {expected}, got {}", response.status);
            tracing::debug!(%err, "status check failed");
            failed = true;
        }
    }
    if let Some(name) = &call.schema {
        let registry = FileRegistry::discover(&config.project_root())?;
        let context = format!("{method} {}", call.path);
        match conforms_to(&response, &registry, name, Some(&context)) {
            Ok(()) => println!("PASS: body conforms to {name}"),
            Err(SchemaCheckError::Mismatch { errors, .. }) => {
                println!("FAIL: body does not conform to {name}");
                for error in errors {
                    println!("  - {error}");
                }
                failed = true;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(u8::from(failed))
}

fn doctor(config_path: Option<&Path>) -> Result<u8> {
    println!("apicheck doctor");
    println!("===============\n");

    let config = match load_config(config_path) {
        Ok(config) => {
            println!("[OK] Config loaded (environment: {})", config.environment);
            config
        }
        Err(e) => {
            println!("[NG] Config: {e:#}");
            println!("\nCreate config file:");
            println!("  apicheck init");
            return Ok(1);
        }
    };

    let root = config.project_root();
    match FileRegistry::discover(&root) {
        Ok(registry) => println!(
            "[{}] Project root {} ({} service(s), {} schema dir(s), {} data dir(s))",
            if registry.service_dirs().is_empty() { "--" } else { "OK" },
            root.display(),
            registry.service_dirs().len(),
            registry.schema_dirs().len(),
            registry.data_dirs().len()
        ),
        Err(e) => println!("[NG] Project root {}: {e}", root.display()),
    }

    let mut ok = true;
    for name in config.services.keys() {
        match config.service(name) {
            Ok(profile) => println!("[OK] Service {name}: {}", profile.url),
            Err(e) => {
                println!("[NG] {e}");
                ok = false;
            }
        }
    }
    for name in config.databases.keys() {
        match config.database(name) {
            Ok(DbProfile::Sqlite { path }) => println!(
                "[{}] Database {name}: {}",
                if path.exists() { "OK" } else { "--" },
                path.display()
            ),
            Ok(DbProfile::Postgres(profile)) => {
                let login = config.db_credentials(profile).user;
                println!(
                    "[OK] Database {name}: {login}@{}:{}/{}",
                    profile.host, profile.port, profile.dbname
                );
            }
            Err(e) => {
                println!("[NG] {e}");
                ok = false;
            }
        }
    }

    println!("\nRun metadata:\n{}", config.metadata());
    Ok(if ok { 0 } else { 1 })
}
