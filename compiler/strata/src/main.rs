//! Strata CLI
//!
//! Resolves classes, defined-type titles and hierarchy keys for one node of
//! an environment, and drives the artifact build.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use strata::{EngineError, Environment, EnvironmentConfig, NodeContext, Workspace, WorkspaceError};

fn main() {
    strata::init_tracing();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let command = &args[1];
    let (positional, options) = split_options(&args[2..]);

    let result = match command.as_str() {
        "resolve" => {
            if positional.len() < 3 {
                eprintln!("Usage: strata resolve <environment> <node> <class>");
                std::process::exit(1);
            }
            with_node(&positional, &options, |node| {
                let dump = node.dump_class(&positional[2])?;
                print_json(&dump);
                Ok(())
            })
        }
        "resource" => {
            if positional.len() < 4 {
                eprintln!("Usage: strata resource <environment> <node> <type> <title>");
                std::process::exit(1);
            }
            with_node(&positional, &options, |node| {
                let dump = node.dump_resource(&positional[2], &positional[3])?;
                print_json(&dump);
                Ok(())
            })
        }
        "lookup" => {
            if positional.len() < 3 {
                eprintln!("Usage: strata lookup <environment> <node> <key>");
                std::process::exit(1);
            }
            with_node(&positional, &options, |node| {
                match node.get_global(&positional[2]) {
                    Some((value, level)) => {
                        print_json(&json!({ "value": value.to_json(), "level": level }));
                    }
                    None => print_json(&json!({ "value": null })),
                }
                Ok(())
            })
        }
        "classes" => {
            if positional.len() < 2 {
                eprintln!("Usage: strata classes <environment> <node>");
                std::process::exit(1);
            }
            with_node(&positional, &options, |node| {
                let classes: Vec<_> = node
                    .included_classes()
                    .into_iter()
                    .map(|(name, level)| json!({ "name": name, "level": level }))
                    .collect();
                print_json(&classes);
                Ok(())
            })
        }
        "build" => {
            if positional.is_empty() {
                eprintln!("Usage: strata build <environment> [--compiler=<command>] [--jobs=<n>]");
                std::process::exit(1);
            }
            build_environment(&positional[0], &options)
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        "version" | "--version" | "-v" => {
            println!("Strata {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("Strata - layered configuration resolution");
    println!();
    println!("Usage: strata <command> [options]");
    println!();
    println!("Commands:");
    println!("  resolve <env> <node> <class>           Resolve a class and print its properties");
    println!("  resource <env> <node> <type> <title>   Resolve one defined-type title");
    println!("  lookup <env> <node> <key>              Look up a hierarchy key or fact");
    println!("  classes <env> <node>                   List classes included by the hierarchy");
    println!("  build <env>                            Compile stale artifacts");
    println!("  help                                   Show this help message");
    println!("  version                                Show version information");
    println!();
    println!("<env> is the environment's root directory; its name is the directory name.");
    println!();
    println!("Options:");
    println!("  --compiler=<command>   External compiler (default: $STRATA_COMPILER)");
    println!("  --jobs=<n>             Build workers (default: cores - 1)");
    println!("  --classes-key=<key>    Hierarchy key holding the class list");
    println!();
    println!("Set RUST_LOG (e.g. RUST_LOG=strata=debug) for tracing output.");
}

#[derive(Default)]
struct Options {
    compiler: Option<String>,
    jobs: Option<usize>,
    class_list_key: Option<String>,
}

fn split_options(args: &[String]) -> (Vec<String>, Options) {
    let mut positional = Vec::new();
    let mut options = Options {
        compiler: std::env::var("STRATA_COMPILER").ok().filter(|c| !c.trim().is_empty()),
        ..Options::default()
    };
    for arg in args {
        if let Some(compiler) = arg.strip_prefix("--compiler=") {
            options.compiler = Some(compiler.to_string());
        } else if let Some(jobs) = arg.strip_prefix("--jobs=") {
            match jobs.parse() {
                Ok(jobs) => options.jobs = Some(jobs),
                Err(_) => {
                    eprintln!("error: --jobs expects a number, got '{jobs}'");
                    std::process::exit(1);
                }
            }
        } else if let Some(key) = arg.strip_prefix("--classes-key=") {
            options.class_list_key = Some(key.to_string());
        } else {
            positional.push(arg.clone());
        }
    }
    (positional, options)
}

fn config_for(root: &str, options: &Options) -> EnvironmentConfig {
    let root = Path::new(root);
    let name = root
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "production".to_string());
    let mut config = EnvironmentConfig::new(name, root);
    if let Some(compiler) = &options.compiler {
        config = config.with_compiler(compiler.clone());
    }
    if let Some(jobs) = options.jobs {
        config = config.with_jobs(jobs);
    }
    if let Some(key) = &options.class_list_key {
        config = config.with_class_list_key(key.clone());
    }
    config
}

fn open(workspace: &Workspace, root: &str, options: &Options) -> Result<Arc<Environment>, EngineError> {
    Ok(workspace.open_environment(config_for(root, options))?)
}

/// Open `positional[0]`, create node `positional[1]`, run `f`, then report
/// warnings.
fn with_node(
    positional: &[String],
    options: &Options,
    f: impl FnOnce(&NodeContext) -> Result<(), EngineError>,
) -> Result<(), EngineError> {
    let workspace = Workspace::new();
    let result = open(&workspace, &positional[0], options).and_then(|environment| {
        let node = environment.node(&positional[1])?;
        f(&node)
    });
    report_warnings(&workspace.warnings());
    result
}

fn build_environment(root: &str, options: &Options) -> Result<(), EngineError> {
    let workspace = Workspace::new();
    let result = open(&workspace, root, options).and_then(|environment| {
        let report = environment.build(&|progress| {
            eprintln!("[{}/{}] batches compiled", progress.completed, progress.total);
        })?;
        if report.batches == 0 {
            println!("All artifacts are up to date");
        } else {
            println!(
                "Compiled {} sources in {} batches, {} failed",
                report.compiled,
                report.batches,
                report.failures.len()
            );
        }
        if report.is_success() {
            Ok(())
        } else {
            Err(WorkspaceError::new(
                "Build failed",
                format!("{} batches failed", report.failures.len()),
            )
            .into())
        }
    });
    report_warnings(&workspace.warnings());
    result
}

fn report_warnings(warnings: &[WorkspaceError]) {
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("error: failed to render output: {e}");
            std::process::exit(1);
        }
    }
}
