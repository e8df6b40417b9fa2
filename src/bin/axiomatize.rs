//! axiomatize - synthesize a modal axiomatization of a frame class
//!
//! Searches the bounded modal-formula template for every formula valid on
//! the goal class of frames, then checks the result for completeness
//! relative to the frame-size bound.
//!
//! ## Usage
//!
//! ```bash
//! # Built-in frame classes
//! axiomatize --preset reflexive
//! axiomatize --preset rst --depth 3 --size 4
//!
//! # A goal theory of your own
//! axiomatize path/to/goal.thy
//!
//! # Skip the completeness check
//! axiomatize --preset transitive --no-completeness
//! ```

use clap::{Parser, ValueEnum};
use modalsynth::modal::Atom;
use modalsynth::synthesis::{
    axiomatize_frame_class, check_completeness, conjoin_in_order, presets, FrameSignature,
    SynthesisOptions,
};
use modalsynth::theory::Theory;
use std::path::PathBuf;

/// Synthesize modal axioms characterizing a class of Kripke frames
#[derive(Parser)]
#[command(name = "axiomatize")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Goal theory file (a `theory ... end` block)
    theory: Option<PathBuf>,

    /// Built-in goal frame class
    #[arg(short, long, value_enum, conflicts_with = "theory")]
    preset: Option<Preset>,

    /// Maximum box/diamond nesting in candidates
    #[arg(long)]
    depth: Option<usize>,

    /// Frame size bound for the structure search
    #[arg(long)]
    size: Option<usize>,

    /// Z3 timeout per query, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Stop after examining this many candidates
    #[arg(long)]
    max_candidates: Option<usize>,

    /// Skip the bounded completeness check
    #[arg(long)]
    no_completeness: bool,

    /// Write a search trace (candidates, verdicts, solver timings) to the
    /// default trace file
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Reflexive,
    Transitive,
    Symmetric,
    Euclidean,
    Rst,
}

fn resolve_goal_theory(cli: &Cli) -> Result<Theory, Box<dyn std::error::Error>> {
    if let Some(path) = &cli.theory {
        let text = std::fs::read_to_string(path)?;
        return Ok(modalsynth::parse_theory(&text)?);
    }

    let preset = match cli.preset.ok_or("pass a theory file or --preset")? {
        Preset::Reflexive => presets::reflexive(),
        Preset::Transitive => presets::transitive(),
        Preset::Symmetric => presets::symmetric(),
        Preset::Euclidean => presets::euclidean(),
        Preset::Rst => presets::rst(),
    };
    Ok(preset?)
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.verbose {
        modalsynth::logging::init_default_logging();
    }

    let config = modalsynth::config::load();
    let mut options = SynthesisOptions::from(&config);
    if let Some(depth) = cli.depth {
        options.modal_depth = depth;
    }
    if let Some(size) = cli.size {
        options.model_size = size;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        options.timeout_ms = timeout_ms;
    }
    if let Some(max_candidates) = cli.max_candidates {
        options.max_candidates = Some(max_candidates);
    }

    let trivial_theory = presets::trivial()?;
    let goal_theory = resolve_goal_theory(&cli)?;
    let signature = FrameSignature::default();
    let atom = Atom::new("p");

    println!(
        "axiomatizing {} (depth {}, size {})",
        goal_theory.name, options.modal_depth, options.model_size
    );

    let report = axiomatize_frame_class(
        &trivial_theory,
        &goal_theory,
        &atom,
        &signature,
        &options,
        |candidate, accepted| {
            let mark = if accepted { "✓" } else { "✘" };
            println!("{} ... {}", candidate, mark);
        },
    )?;

    if !report.exhausted {
        println!(
            "stopped after {} candidates (cap reached)",
            report.examined
        );
    }

    match conjoin_in_order(&report.accepted) {
        None => println!("no valid formulas found within the template"),
        Some(axiomatization) => {
            println!("axiomatization: {}", axiomatization);

            if !cli.no_completeness && report.exhausted {
                let complete = check_completeness(
                    &trivial_theory,
                    &goal_theory,
                    &report.accepted,
                    &atom,
                    &signature,
                    &options,
                )?;
                let mark = if complete { "✓" } else { "✘" };
                println!("complete up to size {} ... {}", options.model_size, mark);
            }
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {}", error);
        std::process::exit(1);
    }
}
