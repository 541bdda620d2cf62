//////////////////////////////////////////////////////////////////////////////
//
// tello-pilot: fly a Tello drone by typing
//
//  tello-pilot parse "go back 2 meters"       show the commands, no drone needed
//  tello-pilot fly "turn left 90 degrees"     connect and run one instruction
//  tello-pilot shell                          interactive command shell
//  tello-pilot probe-video                    find a working video URL
//  tello-pilot analyze --image view.jpg       describe a camera still
//
// In the shell, lines in the drone's own syntax ("up 50", "battery?") are
// sent as they are; anything else is read as a plain-language instruction.
//
//////////////////////////////////////////////////////////////////////////////

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tello_pilot::{
    AnalysisLog, Analyst, CommandParser, Connected, Intent, PlanOutcome, PrimitiveCommand, SceneAnalyst,
    Settings, Tello, TelloOptions, TelloStateReceiver, AUTO_INSTRUCTION, DEFAULT_INSTRUCTION,
};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "tello-pilot", about = "Fly a Tello drone from plain-language instructions")]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, short)]
    settings: Option<PathBuf>,

    /// Don't wait for the host to join a TELLO-* WiFi network
    #[arg(long)]
    skip_wifi_check: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the drone commands an instruction would produce
    Parse {
        text: Vec<String>,
    },
    /// Connect and run a single instruction
    Fly {
        text: Vec<String>,
    },
    /// Interactive command shell
    Shell {
        /// Camera still used for scene analysis
        #[arg(long)]
        image: Option<PathBuf>,
        /// Analyse the view periodically
        #[arg(long)]
        auto_analysis: bool,
    },
    /// Find which video URL delivers frames
    ProbeVideo,
    /// Describe a camera still
    Analyze {
        #[arg(long)]
        image: PathBuf,
        instruction: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run(Cli::parse()).await {
        error!("{err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = match &cli.settings {
        Some(path) => Settings::load(path).with_context(|| format!("reading {}", path.display()))?,
        None => Settings::from_env(),
    };

    match cli.command {
        Commands::Parse { text } => {
            let parser = CommandParser::new(&settings)?;
            let plan = parser.parse(&text.join(" "));
            if plan.is_empty() {
                println!("(no commands)");
            }
            for command in plan.to_strings() {
                println!("{command}");
            }
            Ok(())
        }
        Commands::Fly { text } => {
            let parser = CommandParser::new(&settings)?;
            let plan = parser.parse(&text.join(" "));
            if plan.is_empty() {
                warn!("could not understand {:?}", text.join(" "));
                return Ok(());
            }
            let drone = connect(TelloOptions::new(settings), cli.skip_wifi_check).await?;
            drone.execute(&plan).await?;
            Ok(())
        }
        Commands::Shell { image, auto_analysis } => {
            let mut options = TelloOptions::new(settings.clone());
            let state_receiver = options.with_state();
            let drone = connect(options, cli.skip_wifi_check).await?;
            tokio::spawn(report_status(state_receiver));
            shell(drone, &settings, image.as_deref(), auto_analysis).await
        }
        Commands::ProbeVideo => {
            let mut options = TelloOptions::new(settings);
            let _video = options.with_video();
            let mut drone = connect(options, cli.skip_wifi_check).await?;
            match drone.start_video().await? {
                Some(source) => println!("{}", source.url),
                None => println!("(video not requested)"),
            }
            drone.stop_video().await?;
            Ok(())
        }
        Commands::Analyze { image, instruction } => {
            let mut analyst = SceneAnalyst::from_settings(&settings)?;
            let instruction = if instruction.is_empty() { DEFAULT_INSTRUCTION.to_string() } else { instruction.join(" ") };
            let still = std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            println!("{}", analyst.analyze(&still, &instruction).await?);
            Ok(())
        }
    }
}

async fn connect(options: TelloOptions, skip_wifi_check: bool) -> anyhow::Result<Tello<Connected>> {
    let drone = if skip_wifi_check {
        Tello::new().assume_wifi()
    } else {
        Tello::new().wait_for_wifi().await?
    };
    Ok(drone.connect_with(options).await?)
}

/// Logs the drone's state now and then.
async fn report_status(mut receiver: TelloStateReceiver) {
    let mut last_report: Option<Instant> = None;
    while let Some(state) = receiver.recv().await {
        if last_report.map_or(true, |t| t.elapsed() >= STATUS_INTERVAL) {
            info!("{}", state.summary());
            last_report = Some(Instant::now());
        }
    }
}

async fn analyze_view(
    analyst: &mut SceneAnalyst,
    log: &mut AnalysisLog,
    image: Option<&Path>,
    instruction: &str,
) -> anyhow::Result<()> {
    let still = match image {
        Some(path) => std::fs::read(path).with_context(|| format!("reading {}", path.display()))?,
        None if analyst.is_simulated() => vec![],
        None => anyhow::bail!("scene analysis needs a camera still, see --image"),
    };
    let text = analyst.analyze(&still, instruction).await?;
    let analysis = log.record(instruction, &text);
    println!("[{}] {}", analysis.timestamp.format("%H:%M:%S"), analysis.text);
    Ok(())
}

/// Completes once an emergency word is typed. Other lines are ignored
/// while a plan is running; at the end of input it never completes.
async fn emergency_typed<R: AsyncBufRead + Unpin>(lines: &mut Lines<R>, parser: &CommandParser) {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if parser.parse(&line).intent == Intent::Emergency => return,
            Ok(Some(line)) => println!("busy, ignoring {:?} (emergency words still work)", line.trim()),
            Ok(None) | Err(_) => std::future::pending::<()>().await,
        }
    }
}

async fn shell(drone: Tello<Connected>, settings: &Settings, image: Option<&Path>, auto_analysis: bool) -> anyhow::Result<()> {
    let parser = CommandParser::new(settings)?;
    let mut analyst = SceneAnalyst::from_settings(settings)?;
    let mut log = AnalysisLog::new(settings.max_analysis_history);

    let mut analysis_timer = tokio::time::interval(settings.analysis_interval().max(Duration::from_secs(1)));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("commands: SDK syntax (\"up 50\", \"battery?\"), plain language, \"analyze [question]\", \"quit\"");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            _ = analysis_timer.tick(), if auto_analysis => {
                if let Err(err) = analyze_view(&mut analyst, &mut log, image, AUTO_INSTRUCTION).await {
                    warn!("auto analysis failed: {err:#}");
                }
                continue;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }

        if let Some(question) = line.strip_prefix("analyze") {
            let question = question.trim();
            let question = if question.is_empty() { DEFAULT_INSTRUCTION } else { question };
            if let Err(err) = analyze_view(&mut analyst, &mut log, image, question).await {
                warn!("analysis failed: {err:#}");
            }
            continue;
        }

        // emergency words always win, even over SDK syntax such as "stop"
        let context = log.latest().map(|a| a.text.as_str());
        let plan = parser.parse_with_context(line, context);

        let result = match line.parse::<PrimitiveCommand>() {
            Ok(command) if plan.intent != Intent::Emergency => drone.send_command(&command).await.map(|reply| {
                if command.is_query() {
                    println!("{reply}");
                }
            }),
            _ => {
                if plan.is_empty() {
                    println!("could not understand {line:?}");
                    continue;
                }
                println!("{}", plan.to_strings().join(", "));
                if plan.intent == Intent::Emergency {
                    drone.execute(&plan).await
                } else {
                    let abort = emergency_typed(&mut lines, &parser);
                    match drone.execute_unless(&plan, abort).await {
                        Ok(PlanOutcome::Aborted) => {
                            println!("aborted, motors stopped");
                            Ok(())
                        }
                        Ok(PlanOutcome::Completed) => Ok(()),
                        Err(err) => Err(err),
                    }
                }
            }
        };
        if let Err(err) = result {
            warn!("{err}");
        }
    }

    drone.disconnect().await?;
    Ok(())
}
