// Copyright 2022 Jeremy Wall (Jeremy@marzhilsltudios.com)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! `pysercli`: a thin debugging CLI over the library. There is no host
//! runtime wired in here, so `dump` builds one of a few canned demo graphs
//! rather than accepting an arbitrary graph on the command line, and `load`
//! reconstructs against the library's plain `HashMap`-backed test registry
//! rather than a real type system.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use pyser::config::SerializeConfig;
use pyser::node::NodeKind;
use pyser::testutil::{ReplayBuilder, TestRegistry};
use pyser::value::Value;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect and exercise pyser envelopes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase logging verbosity (can be repeated: -v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serialize a canned demo graph to a file.
    Dump {
        /// Which demo graph to build.
        #[arg(value_enum, default_value_t = Demo::Scalar)]
        demo: Demo,
        /// Output envelope path.
        #[arg(short, long, default_value = "out.pys")]
        output: PathBuf,
        /// zstd compression level.
        #[arg(long, default_value_t = pyser::config::DEFAULT_COMPRESSION_LEVEL)]
        compression_level: i32,
    },
    /// Decode an envelope and print the reconstructed graph.
    Load {
        /// Envelope path.
        input: PathBuf,
    },
    /// Print node/pointer/chunk table statistics without reconstructing
    /// any value (does not require a type registry).
    Inspect {
        /// Envelope path.
        input: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Demo {
    /// A single scalar integer.
    Scalar,
    /// A list containing a repeated shared reference.
    Shared,
    /// A list that contains itself.
    Cycle,
}

fn build_demo(demo: Demo) -> pyser::value::Handle {
    match demo {
        Demo::Scalar => Value::int(42),
        Demo::Shared => {
            let shared = Value::str("shared");
            Value::list(vec![shared.clone(), shared.clone()])
        }
        Demo::Cycle => {
            let list = Value::list(vec![]);
            match &mut *list.borrow_mut() {
                Value::List(items) => items.push(list.clone()),
                _ => unreachable!(),
            }
            list
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Command::Dump {
            demo,
            output,
            compression_level,
        } => run_dump(demo, &output, compression_level),
        Command::Load { input } => run_load(&input),
        Command::Inspect { input } => run_inspect(&input),
    };

    if let Err(err) = result {
        eprintln!("pysercli: {err}");
        std::process::exit(1);
    }
}

fn run_dump(demo: Demo, output: &PathBuf, compression_level: i32) -> pyser::error::Result<()> {
    let root = build_demo(demo);
    let config = SerializeConfig {
        compression_level,
        ..SerializeConfig::default()
    };
    pyser::serialize_to_file(&root, output, &config)?;
    println!("wrote {}", output.display());
    Ok(())
}

fn run_load(input: &PathBuf) -> pyser::error::Result<()> {
    let registry = TestRegistry::new();
    let builder = ReplayBuilder::default();
    let root = pyser::deserialize_from_file(input, &registry, &builder)?;
    println!("root: {:#?}", root.borrow());
    Ok(())
}

fn run_inspect(input: &PathBuf) -> pyser::error::Result<()> {
    let bytes = std::fs::read(input)?;
    let document = pyser::envelope::unframe(&bytes)?;

    println!("root id:       {}", document.root_id);
    println!("nodes:         {}", document.nodes.len());
    println!("pointer edges: {}", document.pointers.len());
    println!("chunks:        {}", document.chunks.len());

    let mut counts: std::collections::BTreeMap<&'static str, usize> = std::collections::BTreeMap::new();
    for node in &document.nodes {
        *counts.entry(tag(&node.kind)).or_default() += 1;
    }
    println!("node kinds:");
    for (kind, count) in counts {
        println!("  {kind:<10} {count}");
    }

    Ok(())
}

fn tag(kind: &NodeKind) -> &'static str {
    kind.tag()
}
