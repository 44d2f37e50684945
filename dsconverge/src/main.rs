mod application;
mod apply;
mod destroy;
mod import;
mod logging;
mod options;
mod plan;
mod state;

use anyhow::Result;
use application::{builtin_catalog, handle_result, runtime, Session};
use clap::{CommandFactory as _, Parser, Subcommand};
use dsconverge_core::Version;
use dsconverge_store_local::LocalServer;
use options::Options;

fn main() {
    let args = Args::parse();
    handle_result(run_args(args));
}

fn run_args(args: Args) -> Result<()> {
    let _frontend = logging::set_up(logging::Options {
        verbose: args.options.verbose,
        color: args.options.use_color(),
    })?;
    let options = &args.options;
    match &args.command {
        Commands::Apply(subargs) => {
            let session = Session::open(options)?;
            runtime().block_on(apply::apply(&session, subargs))
        }
        Commands::Plan(subargs) => {
            let session = Session::open(options)?;
            runtime().block_on(apply::plan(&session, subargs))
        }
        Commands::Validate(subargs) => {
            let session = Session::open(options)?;
            runtime().block_on(apply::validate(&session, subargs))
        }
        Commands::Import(subargs) => {
            let session = Session::open(options)?;
            runtime().block_on(import::import(&session, subargs))
        }
        Commands::Destroy(subargs) => {
            let session = Session::open(options)?;
            runtime().block_on(destroy::destroy(&session, subargs))
        }
        Commands::InitServer { version } => {
            LocalServer::init(&options.server, builtin_catalog()?, version)?;
            eprintln!(
                "Initialized {} running version {}.",
                options.server.display(),
                version
            );
            Ok(())
        }
        Commands::GenerateMan => (|| {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            Ok(())
        })(),
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            Ok(())
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(*shell, &mut cmd, "dsconverge", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// dsconverge: converge a directory server's configuration to a plan
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create and update objects so that the server matches the plan
    Apply(apply::Args),

    /// Show what `apply` would change, without changing anything
    Plan(apply::Args),

    /// Check a plan against the schemas and the server version
    Validate(apply::Args),

    /// Bring an object that already exists on the server under management
    Import(import::Args),

    /// Delete a managed object, or stop managing a singleton
    Destroy(destroy::Args),

    /// Create a local server document with the built-in singletons
    InitServer {
        /// The version the server reports
        version: Version,
    },

    /// Generate markdown documentation for dsconverge
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for dsconverge
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion for dsconverge
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}
