use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "vtxbake", version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bake a scene into a binary vertex buffer and manifest.
    Export(ExportArgs),
    /// Compile a vertex format and print its byte layout.
    Layout(LayoutArgs),
    /// List the built-in converters.
    Converters,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Scene JSON file.
    #[arg(long)]
    scene: PathBuf,
    /// Vertex format JSON file.
    #[arg(long)]
    format: PathBuf,
    /// Output binary path; the manifest is written next to it with a `.json` extension.
    #[arg(long)]
    out: PathBuf,
    /// Export options JSON file; flags below override it.
    #[arg(long)]
    opts: Option<PathBuf>,
    /// Objects to export, in order (default: the scene's selection).
    #[arg(long = "object")]
    objects: Vec<String>,
    /// Export every frame in the scene range instead of only the current frame.
    #[arg(long)]
    all_frames: bool,
    /// Visit each face's loops last-to-first.
    #[arg(long)]
    reverse_winding: bool,
    /// Export world-space geometry.
    #[arg(long)]
    apply_transforms: bool,
    /// Wrap frame offsets around the exported frames.
    #[arg(long)]
    wrap_offsets: bool,
    /// Pack objects in parallel.
    #[arg(long)]
    parallel: bool,
    /// Worker threads for `--parallel`.
    #[arg(long)]
    threads: Option<usize>,
    /// Skip the manifest.
    #[arg(long)]
    no_manifest: bool,
    /// Fail instead of replacing existing output files.
    #[arg(long)]
    no_clobber: bool,
}

#[derive(Parser, Debug)]
struct LayoutArgs {
    /// Vertex format JSON file.
    #[arg(long)]
    format: PathBuf,
    /// Check attribute names against this scene's schema.
    #[arg(long)]
    scene: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Export(args) => cmd_export(args),
        Command::Layout(args) => cmd_layout(args),
        Command::Converters => {
            for name in vtxbake::ConverterRegistry::with_builtins().names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_specs(path: &Path) -> anyhow::Result<Vec<vtxbake::AttributeSpec>> {
    let format = vtxbake::VertexFormat::from_path(path)
        .with_context(|| format!("load vertex format '{}'", path.display()))?;
    format
        .resolve(&vtxbake::ConverterRegistry::with_builtins())
        .with_context(|| format!("resolve vertex format '{}'", path.display()))
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let specs = load_specs(&args.format)?;
    let mut scene = vtxbake::MemoryScene::from_path(&args.scene)
        .with_context(|| format!("load scene '{}'", args.scene.display()))?;

    let mut opts = match &args.opts {
        Some(p) => {
            let s = std::fs::read_to_string(p)
                .with_context(|| format!("read export options '{}'", p.display()))?;
            vtxbake::ExportOpts::from_json(&s)
                .with_context(|| format!("parse export options '{}'", p.display()))?
        }
        None => vtxbake::ExportOpts::default(),
    };
    if args.all_frames {
        opts.frames = vtxbake::FrameSelection::All;
    }
    opts.winding_reversed |= args.reverse_winding;
    opts.apply_world_transform |= args.apply_transforms;
    if args.wrap_offsets {
        opts.frame_targeting = vtxbake::FrameTargeting::Wrap;
    }
    opts.parallel |= args.parallel;
    if args.threads.is_some() {
        opts.threads = args.threads;
    }
    if args.no_manifest {
        opts.write_manifest = false;
    }
    if args.no_clobber {
        opts.overwrite = false;
    }

    let mut session = vtxbake::ExportSession::new(specs, opts);
    if !args.objects.is_empty() {
        session = session.with_objects(
            args.objects
                .into_iter()
                .map(vtxbake::ObjectId::new)
                .collect(),
        );
    }

    let report = session
        .export(&mut scene, &args.out)
        .with_context(|| format!("export to '{}'", args.out.display()))?;
    eprintln!(
        "wrote {} ({} objects, {} frames, {} bytes)",
        report.binary.display(),
        report.stats.objects,
        report.stats.frames,
        report.stats.bytes
    );
    if let Some(m) = &report.manifest {
        eprintln!("wrote {}", m.display());
    }
    if report.stats.material_skips > 0 || report.stats.tex_coord_skips > 0 {
        eprintln!(
            "skipped {} node-graph/missing material faces, {} object-frames without UVs",
            report.stats.material_skips, report.stats.tex_coord_skips
        );
    }
    Ok(())
}

fn cmd_layout(args: LayoutArgs) -> anyhow::Result<()> {
    let specs = load_specs(&args.format)?;
    let layout = match &args.scene {
        Some(p) => {
            let scene = vtxbake::MemoryScene::from_path(p)
                .with_context(|| format!("load scene '{}'", p.display()))?;
            vtxbake::ExportSession::new(specs, vtxbake::ExportOpts::default()).compile(&scene)?
        }
        None => {
            // Without a scene every named attribute is taken as present.
            let mut schema = vtxbake::StaticSchema::new();
            for s in &specs {
                schema.insert(s.source, s.attribute.clone());
            }
            vtxbake::compile(&specs, &schema)?
        }
    };
    print!("{}", layout.dump());
    println!("fingerprint {:016x}", layout.fingerprint());
    Ok(())
}
