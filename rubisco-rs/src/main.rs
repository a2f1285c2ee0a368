use std::process::ExitCode;

use rubisco::builtin_vars::{init_builtin_vars, register_env_callback};
use rubisco::cli::{self, CliArgs};
use rubisco::config::{ConfigError, Configuration};
use rubisco::{Error, Value, VarStore};

fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("rubisco-var: {e}");
            eprintln!("{}", cli::USAGE);
            return ExitCode::FAILURE;
        }
    };

    let default_level = if args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rubisco-var: {e}");
            if let Some(hint) = e.hint() {
                eprintln!("hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Engine(#[from] Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RunError {
    fn hint(&self) -> Option<String> {
        match self {
            RunError::Engine(e) | RunError::Config(ConfigError::Engine(e)) => e.hint(),
            _ => None,
        }
    }
}

fn run(args: CliArgs) -> Result<(), RunError> {
    let mut store = VarStore::new();
    init_builtin_vars(&mut store);
    register_env_callback(&mut store);
    for (name, value) in args.defines {
        store.push(name, value);
    }

    if let Some(path) = &args.config {
        let config = Configuration::load(path, &mut store)?;
        for key in &args.keys {
            let parts: Vec<&str> = key.iter().map(String::as_str).collect();
            let value = config.get_path(&parts, &mut store)?.into_value(&mut store)?;
            print_value(&value)?;
        }
    }

    for template in &args.templates {
        let value = if args.simple {
            match rubisco::fast_format(&mut store, template) {
                Err(e @ Error::NotSimpleExpression { .. }) => {
                    log::debug!("fast path declined ({e}), using the full formatter");
                    rubisco::format(&mut store, template)?
                }
                other => other?,
            }
        } else {
            rubisco::format(&mut store, template)?
        };
        print_value(&value)?;
    }
    Ok(())
}

fn print_value(value: &Value) -> Result<(), serde_json::Error> {
    match value {
        Value::Str(s) => println!("{s}"),
        other => println!("{}", serde_json::to_string(other)?),
    }
    Ok(())
}
