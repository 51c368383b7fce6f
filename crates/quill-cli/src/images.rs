//! [`DirImageResolver`]: finds images in a directory tree laid out as
//!
//! ```text
//! <root>/art/<target>.png
//! <root>/first_page/<target>.png
//! <root>/figures/<target>/<name>
//! ```

use std::path::{Component, Path, PathBuf};

use quill_core::{candidate::ImageKind, ports::ImageResolver};

#[derive(Debug, Clone)]
pub struct DirImageResolver {
  root: PathBuf,
}

impl DirImageResolver {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  fn locate(&self, target_id: &str, kind: ImageKind, name: Option<&str>) -> Option<PathBuf> {
    if !is_plain(target_id) {
      return None;
    }
    match kind {
      ImageKind::Art => Some(self.root.join("art").join(format!("{target_id}.png"))),
      ImageKind::FirstPage => Some(self.root.join("first_page").join(format!("{target_id}.png"))),
      ImageKind::Figure => {
        let name = name.filter(|n| is_plain(n))?;
        Some(self.root.join("figures").join(target_id).join(name))
      }
    }
  }
}

impl ImageResolver for DirImageResolver {
  fn resolve(&self, target_id: &str, kind: ImageKind, name: Option<&str>) -> Option<PathBuf> {
    self.locate(target_id, kind, name).filter(|p| p.is_file())
  }
}

/// A single normal path component: no separators, no `..`.
fn is_plain(s: &str) -> bool {
  let mut components = Path::new(s).components();
  matches!(
    (components.next(), components.next()),
    (Some(Component::Normal(_)), None)
  )
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;

  fn tree() -> PathBuf {
    let root = std::env::temp_dir().join(format!("quill-images-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(root.join("art")).unwrap();
    fs::create_dir_all(root.join("figures/2401.00001")).unwrap();
    fs::write(root.join("art/2401.00001.png"), b"png").unwrap();
    fs::write(root.join("figures/2401.00001/fig2.png"), b"png").unwrap();
    root
  }

  #[test]
  fn resolves_existing_files_only() {
    let root = tree();
    let r = DirImageResolver::new(&root);

    assert_eq!(
      r.resolve("2401.00001", ImageKind::Art, None),
      Some(root.join("art/2401.00001.png"))
    );
    assert_eq!(
      r.resolve("2401.00001", ImageKind::Figure, Some("fig2.png")),
      Some(root.join("figures/2401.00001/fig2.png"))
    );
    assert_eq!(r.resolve("2401.00001", ImageKind::FirstPage, None), None);
    assert_eq!(r.resolve("2401.00001", ImageKind::Figure, None), None);

    fs::remove_dir_all(root).unwrap();
  }

  #[test]
  fn rejects_path_escapes() {
    let root = tree();
    let r = DirImageResolver::new(&root);

    assert_eq!(r.resolve("../etc", ImageKind::Art, None), None);
    assert_eq!(r.resolve("2401.00001", ImageKind::Figure, Some("../../art/2401.00001.png")), None);

    fs::remove_dir_all(root).unwrap();
  }
}
