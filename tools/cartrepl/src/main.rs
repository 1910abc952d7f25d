use std::{
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use cartforth::{dictionary::Behavior, Engine, Params};
use clap::Parser;
use miette::{Context, IntoDiagnostic};
use owo_colors::{OwoColorize, Stream};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// forth source files to load, in order, before anything else runs.
    files: Vec<PathBuf>,

    /// a word to call once per frame after the files are loaded, the way
    /// the console host drives a cartridge.
    #[arg(short, long)]
    entry: Option<String>,

    /// how many frames to run the entry word for.
    #[arg(short, long, default_value_t = 1)]
    frames: u32,

    /// a TOML file of engine parameters (`memory_size`, `max_cycles`,
    /// `stack_leak`).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// overrides the dispatch budget of each top-level call.
    #[arg(long)]
    max_cycles: Option<u32>,

    /// exit once the files are loaded and the frames have run.
    #[arg(long)]
    no_repl: bool,

    /// a comma-separated list of `tracing` targets and levels to enable.
    ///
    /// for example, `warn,cartforth=debug` enables the `WARN` level
    /// globally and the `DEBUG` level for the engine, which logs every
    /// word definition.
    ///
    /// see <https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/targets/struct.Targets.html#filtering-with-targets>
    /// for more details on this syntax.
    #[arg(
        short,
        long = "trace",
        env = "CARTFORTH_TRACE",
        default_value_t = tracing_subscriber::filter::Targets::new().with_default(LevelFilter::INFO),
    )]
    trace_filter: tracing_subscriber::filter::Targets,
}

/// Host context of the REPL engine: text printed by the console natives,
/// written out between fragments.
#[derive(Default)]
struct Console {
    out: String,
}

impl Console {
    fn flush(&mut self) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(self.out.as_bytes())?;
        self.out.clear();
        stdout.flush()
    }
}

fn main() -> miette::Result<()> {
    use tracing_subscriber::prelude::*;

    let args = Args::parse();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(io::stderr),
        )
        .with(args.trace_filter.clone())
        .init();

    let params = load_params(&args)?;
    let mut engine = Engine::from_params(params, Console::default())
        .into_diagnostic()
        .context("failed to start the engine")?;
    register_console(&mut engine);

    for path in &args.files {
        load_file(&mut engine, path)?;
    }

    if let Some(entry) = &args.entry {
        run_frames(&mut engine, entry, args.frames)?;
    }

    if !args.no_repl {
        repl(&mut engine).into_diagnostic()?;
    }
    Ok(())
}

fn load_params(args: &Args) -> miette::Result<Params> {
    let mut params = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .into_diagnostic()
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<Params>(&text)
                .into_diagnostic()
                .with_context(|| format!("invalid engine config in {}", path.display()))?
        }
        None => Params::default(),
    };
    if let Some(max_cycles) = args.max_cycles {
        params = params.with_max_cycles(max_cycles);
    }
    tracing::debug!(?params, "engine parameters");
    Ok(params)
}

fn register_console(engine: &mut Engine<Console>) {
    engine.register_native(".", 1, |vm, args| {
        vm.host_ctxt.out.push_str(&format!("{} ", args[0]));
        Ok(vec![])
    });
    engine.register_native("emit", 1, |vm, args| {
        let ch = u32::try_from(args[0])
            .ok()
            .and_then(char::from_u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        vm.host_ctxt.out.push(ch);
        Ok(vec![])
    });
    engine.register_native("cr", 0, |vm, _args| {
        vm.host_ctxt.out.push('\n');
        Ok(vec![])
    });
    engine.register_native("type", 2, |vm, args| {
        let bytes = vm.read_bytes(args[0], args[1])?;
        vm.host_ctxt.out.push_str(&String::from_utf8_lossy(&bytes));
        Ok(vec![])
    });
    engine.register_native(".s", 0, |vm, _args| {
        let depth = vm.depth();
        vm.host_ctxt.out.push_str(&format!("<{depth}> "));
        Ok(vec![])
    });
}

fn load_file(engine: &mut Engine<Console>, path: &Path) -> miette::Result<()> {
    let label = path.display().to_string();
    let text = fs::read_to_string(path)
        .into_diagnostic()
        .with_context(|| format!("failed to read {label}"))?;
    let res = engine.interpret_source(&text, &label);
    engine.host_ctxt.flush().into_diagnostic()?;
    res.into_diagnostic()
        .with_context(|| format!("failed to load {label}"))?;
    tracing::info!(file = %label, here = engine.here(), "loaded");
    Ok(())
}

/// Calls the entry word once per frame. A guest fault ends the run.
fn run_frames(engine: &mut Engine<Console>, entry: &str, frames: u32) -> miette::Result<()> {
    let address = entry_address(engine, entry)?;

    for frame in 0..frames {
        let res = engine.call_word(address);
        engine.host_ctxt.flush().into_diagnostic()?;
        res.into_diagnostic()
            .with_context(|| format!("`{entry}` failed in frame {frame}"))?;
    }
    tracing::info!(entry, frames, "frames done");
    Ok(())
}

/// Constants and `create`d words also have a value, but calling it would
/// run whatever cells happen to live there.
fn entry_address<T: 'static>(engine: &Engine<T>, entry: &str) -> miette::Result<i32> {
    match engine.lookup(entry).map(|e| e.behavior) {
        Some(Behavior::Compiled(address)) => Ok(address),
        Some(_) => Err(miette::miette!("entry word `{entry}` is not a compiled word")),
        None => Err(miette::miette!("entry word `{entry}` is not defined")),
    }
}

fn repl(engine: &mut Engine<Console>) -> io::Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            println!();
            return Ok(());
        };
        let line = line?;

        let res = engine.interpret_source(&line, "<stdin>");
        engine.host_ctxt.flush()?;
        match res {
            Ok(()) => println!(
                "{}",
                " ok.".if_supports_color(Stream::Stdout, |text| text.green())
            ),
            Err(err) => {
                println!();
                eprintln!("{}", err.if_supports_color(Stream::Stderr, |text| text.red()));
            }
        }
    }
}
