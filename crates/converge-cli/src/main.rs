//! `converge` command-line entry point
//!
//! Translates flags into calls on [`converge_core::Reconciler`] and prints
//! results as JSON on stdout. Logs go to stderr. Exit status is 0 on
//! success and 1 on any error.

use anyhow::{anyhow, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use converge_api::HttpClient;
use converge_core::{generate_overlay, ComponentDocument, ConvergeConfig, Reconciler};
use converge_model::FunctionKind;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("converge")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Reconcile local schema trees and component documents with a remote workspace")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Config file (default: ./converge.toml if present)"),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .global(true)
                .help("Service root URL"),
        )
        .arg(
            Arg::new("workspace-id")
                .long("workspace-id")
                .global(true)
                .help("Workspace to operate on"),
        )
        .arg(
            Arg::new("api-token")
                .long("api-token")
                .global(true)
                .help("Bearer token for the remote API"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Increase log verbosity (-v debug, -vv trace)"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .value_parser(["text", "json"])
                .default_value("text")
                .help("Log output format"),
        )
        .subcommand(schema_command())
        .subcommand(component_command())
}

fn dry_run_arg() -> Arg {
    Arg::new("dry-run")
        .long("dry-run")
        .action(ArgAction::SetTrue)
        .help("Plan only; never open a change set")
}

fn schema_command() -> Command {
    Command::new("schema")
        .about("Push, pull and customize schemas")
        .subcommand_required(true)
        .subcommand(
            Command::new("push")
                .about("Push the schema tree")
                .arg(dry_run_arg())
                .arg(
                    Arg::new("builtin-override")
                        .long("builtin-override")
                        .action(ArgAction::SetTrue)
                        .help("Allow updating fields of builtin schemas"),
                )
                .arg(root_arg()),
        )
        .subcommand(
            Command::new("pull")
                .about("Write remote schemas into the schema tree")
                .arg(
                    Arg::new("names")
                        .required(true)
                        .num_args(1..)
                        .help("Schema names"),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Overwrite existing schema directories"),
                )
                .arg(root_arg()),
        )
        .subcommand(
            Command::new("overlay")
                .about("Customize builtin schemas")
                .subcommand_required(true)
                .subcommand(
                    Command::new("generate")
                        .about("Scaffold an overlay function")
                        .arg(Arg::new("schema").required(true).help("Schema name"))
                        .arg(
                            Arg::new("kind")
                                .required(true)
                                .value_parser(value_parser!(FunctionKind))
                                .help("action, qualification, codeGeneration, management or authentication"),
                        )
                        .arg(Arg::new("name").required(true).help("Function name")),
                )
                .subcommand(
                    Command::new("push")
                        .about("Push the overlay tree")
                        .arg(dry_run_arg()),
                ),
        )
}

fn root_arg() -> Arg {
    Arg::new("root")
        .long("root")
        .value_parser(value_parser!(PathBuf))
        .help("Schema tree root (overrides config)")
}

fn reference_arg() -> Arg {
    Arg::new("component")
        .required(true)
        .help("Component id, name, or search query")
}

fn component_command() -> Command {
    Command::new("component")
        .about("Inspect and update components")
        .subcommand_required(true)
        .subcommand(
            Command::new("get")
                .about("Print a component")
                .arg(reference_arg()),
        )
        .subcommand(
            Command::new("search")
                .about("Search components")
                .arg(Arg::new("query").required(true).help("Free-text query"))
                .arg(
                    Arg::new("schema")
                        .long("schema")
                        .help("Restrict results to a schema"),
                ),
        )
        .subcommand(
            Command::new("update")
                .about("Apply a JSON or YAML component document")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Input document"),
                )
                .arg(dry_run_arg()),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete a component")
                .arg(reference_arg()),
        )
        .subcommand(
            Command::new("upgrade")
                .about("Upgrade a component to its schema's latest variant")
                .arg(reference_arg()),
        )
}

fn init_tracing(matches: &ArgMatches) {
    let filter = match matches.get_count("verbose") {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let json = matches
        .get_one::<String>("log-format")
        .is_some_and(|f| f == "json");

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Config file, then environment, then flags
fn load_config(matches: &ArgMatches) -> Result<ConvergeConfig> {
    let path = matches.get_one::<PathBuf>("config");
    let mut config = ConvergeConfig::load(path.map(PathBuf::as_path))?;
    if let Some(base_url) = matches.get_one::<String>("base-url") {
        config = config.with_base_url(base_url);
    }
    if let Some(workspace_id) = matches.get_one::<String>("workspace-id") {
        config = config.with_workspace_id(workspace_id);
    }
    if let Some(api_token) = matches.get_one::<String>("api-token") {
        config = config.with_api_token(api_token);
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

fn client(config: &ConvergeConfig) -> Result<HttpClient> {
    let client = HttpClient::new(config.client_config()?)?;
    Ok(client)
}

async fn run(matches: ArgMatches) -> Result<()> {
    let config = load_config(&matches)?;
    match matches.subcommand() {
        Some(("schema", args)) => run_schema(config, args).await,
        Some(("component", args)) => run_component(config, args).await,
        _ => Err(anyhow!("no command given")),
    }
}

async fn run_schema(mut config: ConvergeConfig, args: &ArgMatches) -> Result<()> {
    match args.subcommand() {
        Some(("push", args)) => {
            if let Some(root) = args.get_one::<PathBuf>("root") {
                config = config.with_schemas_root(root);
            }
            if args.get_flag("builtin-override") {
                config = config.with_builtin_override(true);
            }
            let client = client(&config)?;
            let report = Reconciler::new(&client, config)
                .push_schemas(args.get_flag("dry-run"))
                .await?;
            print_json(&report)
        }
        Some(("pull", args)) => {
            if let Some(root) = args.get_one::<PathBuf>("root") {
                config = config.with_schemas_root(root);
            }
            let names: Vec<String> = args
                .get_many::<String>("names")
                .map(|names| names.cloned().collect())
                .unwrap_or_default();
            let client = client(&config)?;
            let report = Reconciler::new(&client, config)
                .pull_schemas(&names, args.get_flag("force"))
                .await?;
            print_json(&report)?;
            if report.missing.is_empty() {
                Ok(())
            } else {
                Err(anyhow!("not found remotely: {}", report.missing.join(", ")))
            }
        }
        Some(("overlay", args)) => run_overlay(config, args).await,
        _ => Err(anyhow!("unknown schema command")),
    }
}

async fn run_overlay(config: ConvergeConfig, args: &ArgMatches) -> Result<()> {
    match args.subcommand() {
        Some(("generate", args)) => {
            let schema = required(args, "schema")?;
            let name = required(args, "name")?;
            let kind = args
                .get_one::<FunctionKind>("kind")
                .copied()
                .ok_or_else(|| anyhow!("missing kind"))?;

            let scaffold = generate_overlay(&config.overlays_root, schema, kind, name).await?;
            print_json(&json!({
                "schemaDir": scaffold.schema_dir,
                "codePath": scaffold.code_path,
                "createdSchema": scaffold.created_schema,
            }))
        }
        Some(("push", args)) => {
            let client = client(&config)?;
            let report = Reconciler::new(&client, config)
                .push_overlays(args.get_flag("dry-run"))
                .await?;
            print_json(&report)
        }
        _ => Err(anyhow!("unknown overlay command")),
    }
}

async fn run_component(config: ConvergeConfig, args: &ArgMatches) -> Result<()> {
    let client = client(&config)?;
    let reconciler = Reconciler::new(&client, config);
    match args.subcommand() {
        Some(("get", args)) => {
            let view = reconciler.get_component(required(args, "component")?).await?;
            print_json(&view)
        }
        Some(("search", args)) => {
            let schema = args.get_one::<String>("schema").map(String::as_str);
            let hits = reconciler
                .search_components(required(args, "query")?, schema)
                .await?;
            print_json(&hits)
        }
        Some(("update", args)) => {
            let file = args
                .get_one::<PathBuf>("file")
                .ok_or_else(|| anyhow!("missing file"))?;
            let document = ComponentDocument::load(file).await?;
            let change = reconciler
                .update_component(&document, args.get_flag("dry-run"))
                .await?;
            print_json(&change)
        }
        Some(("delete", args)) => {
            let id = reconciler.delete_component(required(args, "component")?).await?;
            print_json(&json!({ "deleted": id }))
        }
        Some(("upgrade", args)) => {
            let id = reconciler.upgrade_component(required(args, "component")?).await?;
            print_json(&json!({ "upgraded": id }))
        }
        _ => Err(anyhow!("unknown component command")),
    }
}

fn required<'a>(args: &'a ArgMatches, id: &str) -> Result<&'a str> {
    args.get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing argument <{id}>"))
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    init_tracing(&matches);

    if let Err(e) = run(matches).await {
        tracing::error!(error = %e, "command failed");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_valid() {
        cli().debug_assert();
    }

    #[test]
    fn parses_schema_push_flags() {
        let matches = cli()
            .try_get_matches_from(["converge", "schema", "push", "--dry-run", "--builtin-override"])
            .unwrap();
        let (_, schema) = matches.subcommand().unwrap();
        let (name, push) = schema.subcommand().unwrap();
        assert_eq!(name, "push");
        assert!(push.get_flag("dry-run"));
        assert!(push.get_flag("builtin-override"));
    }

    #[test]
    fn parses_overlay_kind() {
        let matches = cli()
            .try_get_matches_from([
                "converge", "schema", "overlay", "generate", "AWS::EC2::Instance", "management", "tidy",
            ])
            .unwrap();
        let generate = matches
            .subcommand_matches("schema")
            .and_then(|m| m.subcommand_matches("overlay"))
            .and_then(|m| m.subcommand_matches("generate"))
            .unwrap();
        assert_eq!(
            generate.get_one::<FunctionKind>("kind"),
            Some(&FunctionKind::Management)
        );
    }

    #[test]
    fn pull_requires_a_name() {
        assert!(cli()
            .try_get_matches_from(["converge", "schema", "pull"])
            .is_err());
    }

    #[test]
    fn global_flags_override_config() {
        let matches = cli()
            .try_get_matches_from([
                "converge",
                "--workspace-id",
                "ws",
                "--api-token",
                "t",
                "component",
                "get",
                "web",
            ])
            .unwrap();
        let config = load_config(&matches).unwrap();
        assert_eq!(config.workspace_id.as_deref(), Some("ws"));
        assert!(config.validate().is_ok());
    }
}
