use kiln::base::{KilnResult, LoadArgs, LoadingState, ResourceKey};
use kiln::loader::{DecodeContext, Resource, ResourceFactory, ResourceLoader};
use std::io::Read;

// Greyscale image with a mip chain, smallest level first
#[derive(Default, Debug)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub mip_levels: Vec<Vec<u8>>,
}

impl Image {
    pub fn solid(
        width: u32,
        height: u32,
        value: u8,
    ) -> Self {
        Image {
            width,
            height,
            mip_levels: vec![vec![value; (width * height) as usize]],
        }
    }
}

struct ImageHeader {
    width: u32,
    height: u32,
    // Levels in the file, and how many of them are decoded
    total_levels: u32,
    levels: u32,
    pattern: String,
}

impl ImageHeader {
    // The file is an option string, for example "width=64; height=64; levels=6; pattern=checker".
    // The "max_levels" load option drops the largest mips.
    fn parse(
        text: &str,
        args: &LoadArgs,
    ) -> Option<Self> {
        let header = LoadArgs::new(text.trim());
        let total_levels = header.get_parsed::<u32>("levels")?.max(1);
        let levels = match args.get_parsed::<u32>("max_levels") {
            Some(max_levels) => total_levels.min(max_levels.max(1)),
            None => total_levels,
        };

        Some(ImageHeader {
            width: header.get_parsed("width")?,
            height: header.get_parsed("height")?,
            total_levels,
            levels,
            pattern: header.get("pattern").unwrap_or("solid").to_string(),
        })
    }

    fn level_size(
        &self,
        level: u32,
    ) -> (u32, u32) {
        let shift = self.total_levels - 1 - level;
        ((self.width >> shift).max(1), (self.height >> shift).max(1))
    }

    fn generate_level(
        &self,
        level: u32,
    ) -> Vec<u8> {
        let (width, height) = self.level_size(level);
        let mut pixels = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let value = match self.pattern.as_str() {
                    "checker" => {
                        if (x / 4 + y / 4) % 2 == 0 {
                            255
                        } else {
                            0
                        }
                    }
                    "gradient" => ((x * 255) / width.max(1)) as u8,
                    _ => 128,
                };
                pixels.push(value);
            }
        }
        pixels
    }
}

// Decodes the header in the first step, then one mip level per step
#[derive(Default)]
pub struct ImageLoader {
    header: Option<ImageHeader>,
    levels: Vec<Vec<u8>>,
}

impl ResourceLoader for ImageLoader {
    fn decode(
        &mut self,
        _ctx: &mut DecodeContext,
        stream: Option<&mut dyn Read>,
        key: &ResourceKey,
        args: &LoadArgs,
    ) -> LoadingState {
        if let Some(delay_ms) = args.get_parsed::<u64>("delay_ms") {
            std::thread::sleep(std::time::Duration::from_millis(delay_ms));
        }

        if self.header.is_none() {
            let mut text = String::new();
            let read: KilnResult<usize> = match stream {
                Some(stream) => stream.read_to_string(&mut text).map_err(|e| e.into()),
                None => Err(format!("{} could not be opened", key).into()),
            };
            if LoadingState::from_result(read, LoadingState::Loading) == LoadingState::Aborted {
                return LoadingState::Aborted;
            }

            self.header = ImageHeader::parse(&text, args);
            if self.header.is_none() {
                log::warn!("{} has a malformed header", key);
                return LoadingState::Aborted;
            }
            return LoadingState::Loading;
        }

        let header = match &self.header {
            Some(header) => header,
            None => return LoadingState::Aborted,
        };

        let level = self.levels.len() as u32;
        self.levels.push(header.generate_level(level));
        log::trace!("{} decoded mip {}", key, level);

        if self.levels.len() as u32 >= header.levels {
            LoadingState::Loaded
        } else {
            LoadingState::PartialLoaded
        }
    }

    fn commit(
        &mut self,
        resource: &Resource,
    ) {
        // Size of the largest level decoded so far
        let (width, height) = match (&self.header, self.levels.len()) {
            (Some(header), decoded) if decoded > 0 => header.level_size(decoded as u32 - 1),
            _ => return,
        };
        let levels = self.levels.clone();
        resource.with_data_mut(|image: &mut Image| {
            image.width = width;
            image.height = height;
            image.mip_levels = levels;
        });
    }

    // Header plus the smallest mip is enough to draw something
    fn default_blocking_iteration(&self) -> u32 {
        2
    }
}

pub struct ImageFactory;

impl ResourceFactory for ImageFactory {
    fn create_resource(
        &self,
        key: &ResourceKey,
        _args: &LoadArgs,
    ) -> Option<Resource> {
        if key.has_extension("img") {
            Some(Resource::new(key, Image::default()))
        } else {
            None
        }
    }

    fn create_loader(&self) -> Box<dyn ResourceLoader> {
        Box::new(ImageLoader::default())
    }
}
