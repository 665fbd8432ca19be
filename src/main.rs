//! Computes (or loads from the cache) the self-collision matrix of a URDF robot and prints it.
//!
//! ```bash
//! self-collision-matrix --urdf src/tests/data/mobile_robot.urdf --tries 2000
//! ```

use std::path::PathBuf;
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use rs_wholebody_model::cache::{CollisionMatrixCache, FileStorage};
use rs_wholebody_model::collision_matrix::{CollisionMatrixConfig, SelfCollisionMatrixBuilder};
use rs_wholebody_model::model_hash::ModelHash;
use rs_wholebody_model::parry_world::ParryWorld;
use rs_wholebody_model::urdf::from_urdf_file;
use rs_wholebody_model::utils::dump_self_collision_matrix;

#[derive(Parser)]
#[command(name = "self-collision-matrix")]
#[command(about = "Compute the link pairs of a robot that need self-collision checks")]
struct Args {
    /// URDF file of the robot
    #[arg(short, long)]
    urdf: PathBuf,

    /// Directory of cached matrices
    #[arg(long, default_value = "data/self_collision_matrix/")]
    cache: PathBuf,

    /// Recompute even if a cached matrix exists
    #[arg(long)]
    no_cache: bool,

    /// Pairs closer than this at the zero state are always colliding (meters)
    #[arg(long, default_value = "0.05")]
    always_threshold: f64,

    /// Pairs closer than this in a sampled state are sometimes colliding (meters)
    #[arg(long, default_value = "0.0")]
    sometimes_threshold: f64,

    /// Number of random joint states to sample
    #[arg(long, default_value = "1000")]
    tries: usize,

    /// Seed of the random joint states
    #[arg(long, default_value = "1337")]
    seed: u64,

    /// Minimum allowed distance stored with every pair
    #[arg(long)]
    min_distance: Option<f64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let robot = from_urdf_file(&args.urdf)
        .with_context(|| format!("Failed to read robot from {}", args.urdf.display()))?;
    info!("robot {} with {} links, {} joints, hash {}", robot.get_name(),
        robot.get_link_names().len(), robot.get_joint_names().len(), ModelHash::of_graph(&robot));

    let builder = SelfCollisionMatrixBuilder::new(CollisionMatrixConfig {
        always_threshold: args.always_threshold,
        sometimes_threshold: args.sometimes_threshold,
        num_rnd_tries: args.tries,
        seed: args.seed,
        min_allowed_distance: args.min_distance,
    });
    let mut world = ParryWorld::new(&robot).context("Failed to build collision world")?;

    let matrix = if args.no_cache {
        builder.build(&robot, &mut world)?
    } else {
        let mut cache = CollisionMatrixCache::new(FileStorage::new(&args.cache));
        cache.load_or_build(&robot, &builder, &mut world)?
    };

    println!("{} link pairs need self-collision checks:", matrix.len());
    dump_self_collision_matrix(&matrix);
    Ok(())
}
