use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use std::io::{Read, Write};
use std::path::PathBuf;

use jira_rewrite::auth::password_store;
use jira_rewrite::config::{Config, config_path, load_config, write_template};
use jira_rewrite::daemon::{DaemonConfig, header_diff, run_daemon};
use jira_rewrite::mail::imap_client::ImapClient;

/// Rewrites JIRA notification Subject and From headers so that subject-based
/// threading and From grouping work. Each message in --source is rewritten into
/// --dest and the original is moved to --backup.
#[derive(Parser)]
#[command(name = "jira_rewrite")]
#[command(about = "Rewrite JIRA notification headers in an IMAP folder", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/jira_rewrite/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args)]
struct RuleArgs {
    /// Regex to match in the Subject
    #[arg(long)]
    regex: Option<String>,

    /// Replacement for --regex (`$1`, `${name}`)
    #[arg(long)]
    replace: Option<String>,

    /// Regex for the From header; group 1 is the display name
    #[arg(long)]
    from_regex: Option<String>,

    /// Domain of the per-author synthetic From addresses
    #[arg(long)]
    synthetic_domain: Option<String>,

    /// Address put in Reply-To of every processed message
    #[arg(long)]
    reply_to: Option<String>,
}

impl RuleArgs {
    fn apply(self, cfg: &mut Config) {
        overlay(&mut cfg.subject_regex, self.regex);
        overlay(&mut cfg.subject_replace, self.replace);
        overlay(&mut cfg.from_regex, self.from_regex);
        overlay(&mut cfg.synthetic_domain, self.synthetic_domain);
        overlay(&mut cfg.reply_to, self.reply_to);
    }
}

#[derive(Subcommand)]
enum Command {
    /// Rewrite every matching message in the source folder
    Run {
        #[arg(long)]
        username: Option<String>,

        /// Folder whose messages to rewrite. Must already exist.
        #[arg(long)]
        source: Option<String>,

        /// Folder to save rewritten messages. Must already exist.
        #[arg(long)]
        dest: Option<String>,

        /// Folder where originals are saved. Must already exist.
        #[arg(long)]
        backup: Option<String>,

        /// Print what would be done
        #[arg(long)]
        dryrun: bool,

        /// File storing the password
        #[arg(long)]
        pwfile: Option<PathBuf>,

        #[arg(long)]
        imap_server: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        /// IMAP SEARCH criteria selecting candidate messages
        #[arg(long)]
        search: Option<String>,

        /// Keep running, one pass every --sleep seconds
        #[arg(long = "loop")]
        repeat: bool,

        /// Seconds between passes in loop mode
        #[arg(long)]
        sleep: Option<u64>,

        #[command(flatten)]
        rules: RuleArgs,
    },

    /// Rewrite one message file (or stdin) and print the result
    Preview {
        file: Option<PathBuf>,

        #[command(flatten)]
        rules: RuleArgs,
    },

    /// Store the IMAP password in the keyring
    SetPassword {
        #[arg(long)]
        username: String,
    },

    /// Write a template config file
    InitConfig,
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::SetPassword { username } => {
            eprintln!("Paste password (end with Ctrl-D):");
            let mut secret = String::new();
            std::io::stdin().read_to_string(&mut secret)?;
            password_store::save_password(&username, secret.trim())?;
            println!("Saved password for {}", username);
            Ok(())
        }

        Command::InitConfig => {
            let path = match cli.config {
                Some(p) => p,
                None => config_path()?,
            };
            write_template(&path)?;
            println!("Created template config at {}; edit it and run again", path.display());
            Ok(())
        }

        Command::Preview { file, rules } => {
            let mut cfg = load_config(cli.config.as_deref())
                .map_err(|e| anyhow!("Configuration error: {e:#}"))?;
            rules.apply(&mut cfg);
            let rewriter = cfg.build_rewriter()?;

            let raw = match file {
                Some(path) => std::fs::read(&path)?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            let out = rewriter.rewrite(&raw)?;
            if out.changed() {
                eprint!("{}", header_diff(&out));
            } else {
                eprintln!("No rewrite needed.");
            }
            std::io::stdout().write_all(&out.bytes)?;
            Ok(())
        }

        Command::Run {
            username,
            source,
            dest,
            backup,
            dryrun,
            pwfile,
            imap_server,
            port,
            search,
            repeat,
            sleep,
            rules,
        } => {
            let mut cfg = load_config(cli.config.as_deref())
                .map_err(|e| anyhow!("Configuration error: {e:#}"))?;
            overlay(&mut cfg.username, username);
            overlay(&mut cfg.source, source);
            overlay(&mut cfg.dest, dest);
            overlay(&mut cfg.backup, backup);
            overlay(&mut cfg.imap_server, imap_server);
            overlay(&mut cfg.imap_port, port);
            overlay(&mut cfg.search, search);
            overlay(&mut cfg.sleep_secs, sleep);
            rules.apply(&mut cfg);

            let rewriter = cfg.build_rewriter()?;
            let username = required(&cfg.username, "username")?;
            let daemon_cfg = DaemonConfig {
                source: required(&cfg.source, "source")?,
                dest: required(&cfg.dest, "dest")?,
                backup: required(&cfg.backup, "backup")?,
                search: cfg.search().to_string(),
                dry_run: dryrun,
                repeat,
                interval_secs: cfg.sleep_secs(),
            };

            let password = password_store::resolve_password(&username, pwfile.as_deref())?;
            let imap = ImapClient::new(cfg.imap_server(), cfg.imap_port(), username);

            run_daemon(|| imap.connect(&password), &rewriter, &daemon_cfg)
        }
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String> {
    value
        .clone()
        .ok_or_else(|| anyhow!("--{name} is required (flag or config file)"))
}
