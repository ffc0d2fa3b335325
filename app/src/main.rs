use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use csv::ReaderBuilder;
use env_logger::Builder;
use glam::{DMat4, DVec2, DVec3};
use log::LevelFilter;

use cloud_core::pointcloud::cloud::PointCloud;
use cloud_core::pointcloud::store::VecPointStore;
use cloud_core::progress::ProgressCallback;
use cloud_io::{load_record, save_record};
use cloud_picking::{pick, CameraMatrices, PickRequest, ViewportState};

#[derive(Parser, Debug)]
#[command(
    name = "cpick",
    about = "Builds a point-cloud octree and resolves screen picks against it",
    version = "0.0.1"
)]
struct Cli {
    /// CSV file with x,y,z columns
    #[arg(short, long, required = true, value_name = "FILE")]
    input: String,

    /// Click position in pixels, "x,y" from the bottom-left corner
    #[arg(short, long, value_name = "X,Y")]
    pick: String,

    /// Square viewport edge in pixels
    #[arg(long, default_value_t = 512)]
    viewport: u32,

    /// Pick tolerance in pixels
    #[arg(long, default_value_t = 8.0)]
    tolerance: f64,

    /// Load a previously saved annotation record before picking
    #[arg(long, value_name = "FILE")]
    load: Option<PathBuf>,

    /// Save the annotation record (reference frame, visibility, point size)
    #[arg(long, value_name = "FILE")]
    save: Option<PathBuf>,
}

fn read_points(path: &str) -> Result<Vec<DVec3>, Box<dyn Error>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut points = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() < 3 {
            return Err(format!("line {}: expected x,y,z", line + 1).into());
        }
        let mut coords = [0.0f64; 3];
        let mut parsed = true;
        for (slot, field) in coords.iter_mut().zip(record.iter()) {
            match field.trim().parse() {
                Ok(value) => *slot = value,
                Err(_) => {
                    parsed = false;
                    break;
                }
            }
        }
        if !parsed {
            if line == 0 {
                continue; // header row
            }
            return Err(format!("line {}: not a coordinate triple", line + 1).into());
        }
        points.push(DVec3::from(coords));
    }
    Ok(points)
}

fn parse_click(text: &str) -> Option<DVec2> {
    let (x, y) = text.split_once(',')?;
    Some(DVec2::new(
        x.trim().parse().ok()?,
        y.trim().parse().ok()?,
    ))
}

struct LogProgress {
    last_decile: u32,
}

impl ProgressCallback for LogProgress {
    fn update(&mut self, percent: f32) {
        let decile = (percent / 10.0) as u32;
        if decile > self.last_decile {
            self.last_decile = decile;
            log::info!("octree build: {:.0}%", percent);
        }
    }
}

fn main() {
    Builder::new()
        .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
        .filter(None, LevelFilter::Info)
        .init();

    let args = Cli::parse();

    log::info!("input file: {}", args.input);
    log::info!("viewport: {0}x{0} px", args.viewport);

    let Some(click) = parse_click(&args.pick) else {
        log::error!("--pick wants \"x,y\" in pixels, got {:?}", args.pick);
        return;
    };

    let points = match read_points(&args.input) {
        Ok(points) => points,
        Err(e) => {
            log::error!("failed to read {}: {}", args.input, e);
            return;
        }
    };
    log::info!("loaded {} points", points.len());

    let mut cloud = PointCloud::new(std::sync::Arc::new(VecPointStore::new(points)));

    if let Some(path) = &args.load {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                log::error!("cannot open {}: {}", path.display(), e);
                return;
            }
        };
        if let Err(e) = load_record(&mut file, &mut cloud) {
            log::error!("cannot load record {}: {}", path.display(), e);
            return;
        }
        log::info!(
            "record loaded: shift {:?}, scale {}",
            cloud.global_shift(),
            cloud.global_scale()
        );
    }

    if !cloud.is_visibility_instantiated() {
        if let Err(e) = cloud.reset_visibility() {
            log::error!("cannot allocate the visibility table: {}", e);
            return;
        }
    }

    let Some(bounds) = cloud.bounding_box() else {
        log::error!("the cloud is empty, nothing to pick");
        return;
    };

    log::info!("building the octree...");
    let mut progress = LogProgress { last_decile: 0 };
    if let Err(e) = cloud.compute_octree(Some(&mut progress)) {
        log::error!("octree build failed: {}", e);
        return;
    }

    // top-down orthographic camera: the cloud's xy extent fills the viewport
    let camera = CameraMatrices {
        modelview: DMat4::IDENTITY,
        projection: DMat4::orthographic_rh_gl(
            bounds.min.x,
            bounds.max.x,
            bounds.min.y,
            bounds.max.y,
            -(bounds.max.z + 1.0),
            -(bounds.min.z - 1.0),
        ),
        viewport: [0, 0, args.viewport as i32, args.viewport as i32],
    };
    let viewport = ViewportState {
        perspective: false,
        pixel_size: (bounds.max.x - bounds.min.x) / args.viewport as f64,
    };
    let request = PickRequest {
        click,
        pick_width: args.tolerance,
        pick_height: args.tolerance,
    };

    match pick(&cloud, &camera, Some(&viewport), &request) {
        Some(result) => {
            let point = cloud.point(result.index);
            log::info!(
                "picked point #{} at {:?} (global {:?}), squared distance {:.3}",
                result.index,
                point,
                cloud.to_global(point),
                result.square_dist
            );
        }
        None => log::info!("no point under the click"),
    }

    if let Some(path) = &args.save {
        let mut file = match File::create(path) {
            Ok(file) => file,
            Err(e) => {
                log::error!("cannot create {}: {}", path.display(), e);
                return;
            }
        };
        match save_record(&mut file, &cloud) {
            Ok(()) => log::info!("record saved to {}", path.display()),
            Err(e) => log::error!("cannot save record: {}", e),
        }
    }
}
