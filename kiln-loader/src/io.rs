use kiln_base::{KilnResult, ResourceKey};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Opens the byte stream behind a key. Implementations are called from the decode threads.
pub trait ResourceIO: Send + Sync {
    fn open_read(
        &self,
        key: &ResourceKey,
    ) -> std::io::Result<Box<dyn Read + Send>>;
}

/// Reads resources from files under a root directory
pub struct DiskResourceIO {
    root_path: PathBuf,
}

impl DiskResourceIO {
    pub fn new(root_path: impl Into<PathBuf>) -> KilnResult<Self> {
        let root_path = root_path.into();
        if !root_path.is_dir() {
            return Err(format!("Resource root {:?} is not a directory", root_path).into());
        }

        Ok(DiskResourceIO { root_path })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    fn resolve(
        &self,
        key: &ResourceKey,
    ) -> std::io::Result<PathBuf> {
        // Normalized keys only keep ".." at the front
        if key.as_str().split('/').next() == Some("..") {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{} is outside of the resource root", key),
            ));
        }

        if key.is_absolute() {
            Ok(PathBuf::from(key.as_str()))
        } else {
            Ok(self.root_path.join(key.as_str()))
        }
    }
}

impl ResourceIO for DiskResourceIO {
    fn open_read(
        &self,
        key: &ResourceKey,
    ) -> std::io::Result<Box<dyn Read + Send>> {
        profiling::scope!("DiskResourceIO::open_read");
        let path = self.resolve(key)?;
        log::trace!("open {:?}", path);
        let file = std::fs::File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// For managers whose factories synthesize everything, every open fails with `NotFound`
#[derive(Default)]
pub struct NullResourceIO;

impl ResourceIO for NullResourceIO {
    fn open_read(
        &self,
        key: &ResourceKey,
    ) -> std::io::Result<Box<dyn Read + Send>> {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} has no backing data", key),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kiln-io-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn reads_files_under_root() {
        let dir = scratch_dir("read");
        std::fs::create_dir_all(dir.join("textures")).unwrap();
        std::fs::write(dir.join("textures/a.txt"), b"hello").unwrap();

        let io = DiskResourceIO::new(&dir).unwrap();
        let mut contents = String::new();
        io.open_read(&ResourceKey::new("textures\\a.txt"))
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "hello");

        let missing = io.open_read(&ResourceKey::new("textures/missing.txt"));
        assert_eq!(missing.err().unwrap().kind(), std::io::ErrorKind::NotFound);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn rejects_keys_outside_root() {
        let dir = scratch_dir("escape");
        let io = DiskResourceIO::new(&dir).unwrap();
        let result = io.open_read(&ResourceKey::new("a/../../secret.txt"));
        assert_eq!(
            result.err().unwrap().kind(),
            std::io::ErrorKind::PermissionDenied
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn dotted_leaf_names_are_not_escapes() {
        let dir = scratch_dir("dotted");
        std::fs::write(dir.join("..hidden.txt"), b"hidden").unwrap();

        let io = DiskResourceIO::new(&dir).unwrap();
        let mut contents = String::new();
        io.open_read(&ResourceKey::new("..hidden.txt"))
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "hidden");

        let escape = io.open_read(&ResourceKey::new("../..hidden.txt"));
        assert_eq!(
            escape.err().unwrap().kind(),
            std::io::ErrorKind::PermissionDenied
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn root_must_exist() {
        assert!(DiskResourceIO::new("/definitely/not/a/kiln/root").is_err());
        assert!(NullResourceIO.open_read(&ResourceKey::new("a")).is_err());
    }
}
