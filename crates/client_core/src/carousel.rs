//! Client-local navigation over an environment's image list.

use serde::Serialize;
use shared::domain::EnvironmentId;

/// Position is always a valid index into `images`, or 0 when `images` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Carousel {
    environment_id: Option<EnvironmentId>,
    images: Vec<String>,
    index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CarouselSnapshot {
    pub environment_id: Option<EnvironmentId>,
    pub images: Vec<String>,
    pub index: usize,
}

impl CarouselSnapshot {
    pub fn current_image(&self) -> Option<&str> {
        self.images.get(self.index).map(String::as_str)
    }

    pub fn shows_navigation(&self) -> bool {
        self.images.len() > 1
    }
}

impl Carousel {
    pub fn load(&mut self, environment_id: EnvironmentId, images: Vec<String>) {
        self.environment_id = Some(environment_id);
        self.images = images;
        self.index = 0;
    }

    pub fn clear(&mut self) {
        self.environment_id = None;
        self.images.clear();
        self.index = 0;
    }

    pub fn next(&mut self) -> bool {
        self.step(1)
    }

    pub fn prev(&mut self) -> bool {
        self.step(-1)
    }

    /// Jumps straight to `index`; out-of-range targets are ignored.
    pub fn jump_to(&mut self, index: usize) -> bool {
        if index >= self.images.len() || index == self.index {
            return false;
        }
        self.index = index;
        true
    }

    fn step(&mut self, direction: isize) -> bool {
        let len = self.images.len();
        if len < 2 {
            return false;
        }
        let len = len as isize;
        self.index = (self.index as isize + direction).rem_euclid(len) as usize;
        true
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn environment_id(&self) -> Option<&EnvironmentId> {
        self.environment_id.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.environment_id.is_some()
    }

    pub fn snapshot(&self) -> CarouselSnapshot {
        CarouselSnapshot {
            environment_id: self.environment_id.clone(),
            images: self.images.clone(),
            index: self.index,
        }
    }
}

/// Case-insensitive match on the image extensions the gallery can show.
pub fn is_supported_image(name: &str) -> bool {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return false;
    };
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "jpg" | "jpeg" | "png" | "gif" | "webp"
    )
}
