//! Command line parsing

use std::time::Duration;

/// What the binary was asked to do
#[derive(Debug, PartialEq)]
pub enum RunMode {
    Run(CliArgs),
    Help,
    Version,
}

#[derive(Debug, Default, PartialEq)]
pub struct CliArgs {
    pub task: String,
    pub start_url: Option<String>,
    pub config_path: Option<String>,
    pub max_steps: Option<u32>,
    pub timeout: Option<Duration>,
    /// Complete the run once the page URL contains this text
    pub success_url: Option<String>,
    pub history_db: Option<String>,
    pub headful: bool,
}

/// Parse arguments (without the program name)
pub fn parse_args<I>(args: I) -> Result<RunMode, String>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut task_words = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| format!("{} needs a value", flag));

        match arg.as_str() {
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-V" => return Ok(RunMode::Version),
            "--url" | "-u" => parsed.start_url = Some(value(&arg)?),
            "--config" | "-c" => parsed.config_path = Some(value(&arg)?),
            "--history-db" => parsed.history_db = Some(value(&arg)?),
            "--success-url" => parsed.success_url = Some(value(&arg)?),
            "--max-steps" => {
                let raw = value(&arg)?;
                parsed.max_steps = Some(raw.parse().map_err(|_| format!("invalid step count '{}'", raw))?);
            }
            "--timeout" => {
                let raw = value(&arg)?;
                let secs: u64 = raw.parse().map_err(|_| format!("invalid timeout '{}'", raw))?;
                parsed.timeout = Some(Duration::from_secs(secs));
            }
            "--headful" => parsed.headful = true,
            flag if flag.starts_with('-') && flag.len() > 1 => return Err(format!("unknown option '{}'", flag)),
            _ => task_words.push(arg.clone()),
        }
    }

    parsed.task = task_words.join(" ").trim().to_string();
    if parsed.task.is_empty() {
        return Err("no task given".to_string());
    }
    Ok(RunMode::Run(parsed))
}

pub fn print_help() {
    println!("webpilot - LLM-driven browser agent");
    println!();
    println!("Usage:");
    println!("  webpilot [options] <task...>");
    println!();
    println!("Options:");
    println!("  -u, --url <URL>          Open this page before the first step");
    println!("  -c, --config <FILE>      Configuration file (default: ./webpilot.toml)");
    println!("      --max-steps <N>      Override the step limit");
    println!("      --timeout <SECS>     Override the wall-clock budget");
    println!("      --success-url <TEXT> Finish once the page URL contains TEXT");
    println!("      --history-db <FILE>  Persist run history to a SQLite file");
    println!("      --headful            Show the browser window");
    println!("  -h, --help               Show this help message");
    println!("  -V, --version            Show version");
    println!();
    println!("Environment Variables:");
    println!("  LLM_API_KEY              API key (required)");
    println!("  LLM_MODEL                Model name");
    println!("  LLM_PROVIDER             Provider: claude or openai (default: claude)");
    println!("  LLM_BASE_URL             Custom API endpoint");
    println!("  WEBPILOT_HEADLESS        Run the browser headless (default: true)");
    println!("  WEBPILOT_MAX_STEPS       Step limit");
    println!("  WEBPILOT_TOKEN_BUDGET    Context window budget in tokens");
    println!("  MCP_CONFIG_PATH          MCP server list (JSON or TOML)");
    println!("  DETECTOR_URL             Image detector endpoint");
    println!("  HISTORY_DB               SQLite file for run history");
    println!("  RUST_LOG                 Log filter (default: info)");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<RunMode, String> {
        parse_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_task_and_options() {
        let mode = parse(&[
            "--url",
            "https://shop.test",
            "find",
            "the",
            "--max-steps",
            "12",
            "cheapest lamp",
            "--headful",
        ])
        .unwrap();

        let RunMode::Run(args) = mode else {
            panic!("expected run mode");
        };
        assert_eq!(args.task, "find the cheapest lamp");
        assert_eq!(args.start_url.as_deref(), Some("https://shop.test"));
        assert_eq!(args.max_steps, Some(12));
        assert!(args.headful);
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(parse(&["do", "things", "--help"]).unwrap(), RunMode::Help);
        assert_eq!(parse(&["-V"]).unwrap(), RunMode::Version);
    }

    #[test]
    fn test_errors() {
        assert!(parse(&[]).unwrap_err().contains("no task"));
        assert!(parse(&["task", "--max-steps"]).unwrap_err().contains("needs a value"));
        assert!(parse(&["task", "--max-steps", "many"]).is_err());
        assert!(parse(&["task", "--fast"]).unwrap_err().contains("unknown option"));
    }

    #[test]
    fn test_timeout() {
        let RunMode::Run(args) = parse(&["--timeout", "90", "go"]).unwrap() else {
            panic!("expected run mode");
        };
        assert_eq!(args.timeout, Some(Duration::from_secs(90)));
    }
}
