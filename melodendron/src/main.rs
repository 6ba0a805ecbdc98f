// Melodendron CLI entry point.
//
// Trains a multiple-viewpoint model on one MIDI file and writes a new piece
// in its style. The pipeline: config → parse MIDI → states → train →
// generate → plagiarism report → MIDI output.
//
// Usage:
//   cargo run -p melodendron --bin generate -- input.mid [--output out.mid]
//     [--config gen.json] [--viewpoints a,b,c] [--max-order N] [--order N]
//     [--length N] [--policy NAME] [--factor F] [--seed N] [--tracks 0,2]
//
// Policies: uniform_union, strict_intersection, inverse_size_weighted,
// exponential_weighted. Flags override values loaded from --config.
// Set RUST_LOG (e.g. RUST_LOG=melodendron=debug) for library logging.

use clap::Parser;
use melodendron::config::GeneratorConfig;
use melodendron::midi::{self, MidiSource};
use melodendron::stats::{PlagiarismSummary, SequenceSummary};
use melodendron::{Model, Policy, Result};
use melodendron_prng::Prng;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "generate", about = "Generate music in the style of a MIDI file")]
struct Cli {
    /// Source MIDI file to learn from
    input: PathBuf,

    /// Where to write the generated MIDI file
    #[arg(short, long, default_value = "output.mid")]
    output: PathBuf,

    /// JSON generator configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated viewpoints to predict on
    #[arg(long, value_delimiter = ',')]
    viewpoints: Option<Vec<String>>,

    /// Longest context recorded during training
    #[arg(long)]
    max_order: Option<usize>,

    /// Context length used while generating
    #[arg(long)]
    order: Option<usize>,

    /// Number of states to generate
    #[arg(short, long)]
    length: Option<usize>,

    /// Selection policy
    #[arg(short, long)]
    policy: Option<String>,

    /// Contrast factor for the exponential policy
    #[arg(long)]
    factor: Option<f64>,

    #[arg(short, long)]
    seed: Option<u64>,

    /// Comma-separated track indices to merge (default: all)
    #[arg(long, value_delimiter = ',')]
    tracks: Option<Vec<usize>>,
}

impl Cli {
    /// Load the configured defaults and apply command-line overrides.
    fn config(&self) -> Result<GeneratorConfig> {
        let mut config = match &self.config {
            Some(path) => GeneratorConfig::load(path)?,
            None => GeneratorConfig::default(),
        };
        if let Some(viewpoints) = &self.viewpoints {
            config.viewpoints = viewpoints.clone();
        }
        if let Some(max_order) = self.max_order {
            config.max_order = max_order;
        }
        if let Some(order) = self.order {
            config.order = order;
        }
        if let Some(length) = self.length {
            config.length = length;
        }
        if let Some(policy) = &self.policy {
            config.policy = policy.parse()?;
        }
        if let (Some(f), Policy::ExponentialWeighted { factor }) =
            (self.factor, &mut config.policy)
        {
            *factor = f;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(tracks) = &self.tracks {
            config.tracks = Some(tracks.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.config()?;
    let seed = config.seed.unwrap_or_else(clock_seed);

    println!("=== Melodendron ===");
    println!("Input: {}", cli.input.display());
    println!("Output: {}", cli.output.display());
    println!("Viewpoints: {}", config.viewpoints.join(", "));
    println!("Max order: {}, generation order: {}", config.max_order, config.order);
    println!("Length: {}", config.length);
    println!("Policy: {:?}", config.policy);
    println!("Seed: {seed}");
    println!();

    let mut rng = Prng::new(seed);

    println!("[1/5] Parsing MIDI...");
    let source = MidiSource::open(&cli.input)?;
    let info = source.info();
    println!("  {info}");

    println!("[2/5] Building states...");
    let tracks = config.tracks.as_deref().unwrap_or(&[]);
    let states = source.states(tracks)?;
    println!("{}", indent(&SequenceSummary::of(&states).to_string()));

    println!("[3/5] Training model...");
    let mut model = Model::new(&config.viewpoints, config.max_order)?;
    model.ingest(&states, config.max_order)?;
    for viewpoint in model.viewpoints() {
        let trie = model.trie(viewpoint)?;
        let alphabet = model.alphabet(viewpoint)?;
        println!(
            "  {viewpoint}: {} symbols, {} trie nodes",
            alphabet.len(),
            trie.node_count()
        );
    }

    println!("[4/5] Generating {} states...", config.length);
    let generated = model.generate(
        config.length,
        &config.policy,
        config.order,
        &mut rng,
    )?;
    println!("{}", indent(&PlagiarismSummary::of(&generated).to_string()));

    println!("[5/5] Writing MIDI...");
    let tempo = info.tempo_micros.unwrap_or(midi::DEFAULT_TEMPO_MICROS);
    midi::write_midi(&generated, info.ticks_per_beat, tempo, &cli.output)?;
    println!("  Wrote {}", cli.output.display());
    Ok(())
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn indent(text: &str) -> String {
    text.lines().map(|line| format!("  {line}")).collect::<Vec<_>>().join("\n")
}
