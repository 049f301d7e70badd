use clap::Parser;
use std::io::Read;

use lsh::shell::{Shell, ShellConfig};
use lsh::ShellOptions;

#[derive(Parser)]
#[command(name = "lsh")]
#[command(about = "A POSIX-flavored command-language interpreter")]
#[command(version)]
struct Cli {
    /// Execute the script from the command line argument
    #[arg(short = 'c')]
    script: Option<String>,

    /// Exit immediately if a command exits with non-zero status
    #[arg(short = 'e', long = "errexit")]
    errexit: bool,

    /// Working directory for the script
    #[arg(long = "cwd")]
    cwd: Option<String>,

    /// Output the result as JSON (stdout, stderr, exitCode)
    #[arg(long = "json")]
    json: bool,

    /// Script file to execute
    #[arg()]
    script_file: Option<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    // Script source: -c, file, or stdin
    let script = if let Some(s) = cli.script {
        s
    } else if let Some(ref file) = cli.script_file {
        match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("lsh: cannot read script file: {}: {}", file, e);
                std::process::exit(1);
            }
        }
    } else {
        use std::io::IsTerminal;
        if std::io::stdin().is_terminal() {
            eprintln!("lsh: no script provided; use -c 'script', a script file, or pipe via stdin");
            std::process::exit(1);
        }
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).unwrap_or_default();
        buf
    };

    let mut shell = Shell::new(ShellConfig {
        cwd: cli.cwd,
        options: Some(ShellOptions {
            errexit: cli.errexit,
            ..Default::default()
        }),
        ..Default::default()
    });

    let result = match shell.exec(&script).await {
        Ok(result) => result,
        Err(parse_error) => {
            // Parse errors surface here; format and map to exit code 2
            eprintln!("lsh: {}", parse_error);
            std::process::exit(2);
        }
    };

    if cli.json {
        println!("{}", serde_json::json!({
            "stdout": result.stdout,
            "stderr": result.stderr,
            "exitCode": result.exit_code,
        }));
    } else {
        if !result.stdout.is_empty() {
            print!("{}", result.stdout);
        }
        if !result.stderr.is_empty() {
            eprint!("{}", result.stderr);
        }
    }

    std::process::exit(result.exit_code);
}
