use clap::{Parser as ClapParser, Subcommand};
use mace_lang::cli::{self, CheckOptions, CheckResult, CliError};
use std::io::{self, Read};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "mace")]
#[command(about = "Mace - A path query language for selecting, transforming, and mutating JSON")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query against JSON input
    Query {
        /// The query to run
        query: String,

        /// JSON input (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,

        /// Read YYYY-MM-DD and YYYY-MM-DD HH:MM:SS strings as dates
        #[arg(long)]
        parse_dates: bool,

        /// Deepest expression nesting accepted
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Only validate a query's syntax
    Check {
        /// The query to validate
        query: String,
    },

    /// List built-in functions, or describe one
    Functions {
        /// Function name
        name: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("MACE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Query {
            query,
            input,
            pretty,
            parse_dates,
            max_depth,
        } => run_query(query, input, pretty, parse_dates, max_depth),
        Commands::Check { query } => run_check(query),
        Commands::Functions { name: None } => {
            print!("{}", cli::functions_overview());
            Ok(())
        }
        Commands::Functions { name: Some(name) } => cli::function_doc(&name).map(|doc| {
            print!("{}", doc);
        }),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run_query(
    query: String,
    input: Option<String>,
    pretty: bool,
    parse_dates: bool,
    max_depth: Option<usize>,
) -> Result<(), CliError> {
    let input = match input {
        Some(s) => Some(s),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Some(buffer)
        }
        None => None,
    };

    let options = CheckOptions {
        query,
        input,
        pretty,
        syntax_only: false,
        parse_dates,
        max_depth,
    };

    if let CheckResult::Success(output) = cli::execute_check(&options)? {
        println!("{}", output);
    }
    Ok(())
}

fn run_check(query: String) -> Result<(), CliError> {
    let options = CheckOptions {
        query,
        syntax_only: true,
        ..Default::default()
    };

    if let CheckResult::SyntaxValid { assignment } = cli::execute_check(&options)? {
        if assignment {
            println!("Syntax is valid (assignment)");
        } else {
            println!("Syntax is valid");
        }
    }
    Ok(())
}
