use kiln::base::{LoadArgs, LoadingState, ResourceKey};
use kiln::loader::{
    BlockingMode, DecodeContext, Resource, ResourceFactory, ResourceLoader, ResourcePtr,
};
use std::io::{BufRead, BufReader, Read};

#[derive(Default)]
pub struct Scene {
    pub children: Vec<ResourcePtr>,
}

// A scene file lists the resources it needs, one key per line, relative to the scene
#[derive(Default)]
pub struct SceneLoader {
    children: Vec<ResourcePtr>,
}

impl ResourceLoader for SceneLoader {
    fn decode(
        &mut self,
        ctx: &mut DecodeContext,
        stream: Option<&mut dyn Read>,
        key: &ResourceKey,
        args: &LoadArgs,
    ) -> LoadingState {
        let stream = match stream {
            Some(stream) => stream,
            None => {
                log::warn!("{} could not be opened", key);
                return LoadingState::Aborted;
            }
        };

        // Children only see the options meant for them
        let child_args = args.filtered(|name| name == "delay_ms" || name == "max_levels");
        let directory = key.branch();
        for line in BufReader::new(stream).lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::warn!("{}: {}", key, e);
                    return LoadingState::Aborted;
                }
            };

            if line.trim().is_empty() {
                continue;
            }
            let child_key = directory.join(line.trim());

            match ctx.load_dependency(&child_key, BlockingMode::NonBlock, 0, child_args.clone()) {
                Some(child) => self.children.push(child),
                None => log::warn!("{} needs {}, which can't be loaded", key, child_key),
            }
        }

        LoadingState::Loaded
    }

    fn commit(
        &mut self,
        resource: &Resource,
    ) {
        let children = self.children.clone();
        resource.with_data_mut(|scene: &mut Scene| scene.children = children);
    }
}

pub struct SceneFactory;

impl ResourceFactory for SceneFactory {
    fn create_resource(
        &self,
        key: &ResourceKey,
        _args: &LoadArgs,
    ) -> Option<Resource> {
        if key.has_extension("scene") {
            Some(Resource::new(key, Scene::default()))
        } else {
            None
        }
    }

    fn create_loader(&self) -> Box<dyn ResourceLoader> {
        Box::new(SceneLoader::default())
    }
}
