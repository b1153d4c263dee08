mod example_image_resource;
mod example_scene_resource;

use example_image_resource::{Image, ImageFactory};
use example_scene_resource::{Scene, SceneFactory};
use kiln::base::{KilnResult, LoadArgs, ResourceKey};
use kiln::loader::{
    BlockingMode, CallbackTarget, DiskResourceIO, Resource, ResourceManager,
    ResourceManagerConfig, ResourcePtr,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn data_source_path() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/data"))
}

// Stays hidden until everything it draws is usable
struct SceneNode {
    name: String,
    visible: AtomicBool,
}

impl CallbackTarget for SceneNode {
    fn set_enabled(
        &self,
        enabled: bool,
    ) {
        log::debug!("{} visible: {}", self.name, enabled);
        self.visible.store(enabled, Ordering::Release);
    }

    fn on_resource_ready(
        &self,
        key: &ResourceKey,
    ) {
        log::info!("{} can be drawn, {} is ready", self.name, key);
    }
}

fn print_image(
    manager: &ResourceManager,
    resource: &ResourcePtr,
) {
    let levels = resource
        .with_data(|image: &Image| image.mip_levels.len())
        .unwrap_or(0);
    let state = manager
        .get_loader(resource.key())
        .map(|loader| format!("{:?}", loader.loading_state()))
        .unwrap_or_else(|| "not cached".to_string());
    println!(
        "{} {} mips, {} commits, {}",
        resource.key(),
        levels,
        resource.commit_count(),
        state
    );
}

fn main() -> KilnResult<()> {
    // Setup logging
    env_logger::Builder::default()
        .write_style(env_logger::WriteStyle::Always)
        .filter_level(log::LevelFilter::Debug)
        .init();

    let config = ResourceManagerConfig::from_file(data_source_path().join("kiln.json"))?;
    let manager = ResourceManager::new(Box::new(DiskResourceIO::new(data_source_path())?), config)?;
    manager.add_factory(Box::new(ImageFactory));
    manager.add_factory(Box::new(SceneFactory));

    // Generated resources go straight into the cache
    manager.cache(Arc::new(Resource::new(
        "builtin/white.img",
        Image::solid(4, 4, 255),
    )));

    // The splash image is needed before the first frame
    let splash = manager
        .load("textures/logo.img", BlockingMode::LoaderDefault, 10, "")
        .ok_or("no factory for the splash image")?;
    print_image(&manager, &splash);

    let node = Arc::new(SceneNode {
        name: "main".to_string(),
        visible: AtomicBool::new(false),
    });
    // Low quality settings keep only the four smallest mips
    let scene_args = LoadArgs::new("delay_ms=20").with("max_levels", "4");
    let scene = manager
        .load("scene/main.scene", BlockingMode::NonBlock, 0, scene_args)
        .ok_or("no factory for the scene")?;
    manager.register_callback("scene/main.scene", &node, true, None);

    let start = Instant::now();
    loop {
        std::thread::sleep(Duration::from_millis(15));
        manager.process_loading_events(Some(Instant::now()), Duration::from_millis(5));

        let children = scene
            .with_data(|scene: &Scene| scene.children.clone())
            .unwrap_or_default();
        for child in &children {
            print_image(&manager, child);
        }

        let all_loaded = !children.is_empty()
            && children.iter().all(|child| {
                manager
                    .get_loader(child.key())
                    .map(|loader| loader.loading_state().is_stopped())
                    .unwrap_or(false)
            });
        if node.visible.load(Ordering::Acquire) && all_loaded {
            println!("scene fully loaded after {:?}", start.elapsed());
            break;
        }

        if start.elapsed() > Duration::from_secs(30) {
            return Err("scene took too long to load".into());
        }
    }

    Ok(())
}
