use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use pldbg_core::surface::EditingSurface;
use pldbg_core::target::PlSchema;
use thiserror::Error;

use crate::pl_parser::infer_schema;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("failed to read PL source at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write PL source at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
struct BufferState {
    content: String,
    saved_content: String,
}

#[derive(Debug)]
pub struct BufferSurface {
    path: Option<PathBuf>,
    package_name: Option<String>,
    state: Mutex<BufferState>,
}

impl BufferSurface {
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: None,
            package_name: None,
            state: Mutex::new(BufferState {
                saved_content: content.clone(),
                content,
            }),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, SurfaceError> {
        let path = path.into();
        let content = fs::read_to_string(&path).map_err(|source| SurfaceError::Read {
            path: path.clone(),
            source,
        })?;
        let mut surface = Self::new(content);
        surface.path = Some(path);
        Ok(surface)
    }

    #[must_use]
    pub fn in_package(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = Some(package_name.into());
        self
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn edit(&self, content: impl Into<String>) {
        self.lock_state().content = content.into();
    }

    pub fn edit_line(&self, line: u32, text: &str) {
        let mut state = self.lock_state();
        let mut lines: Vec<&str> = state.content.split('\n').collect();
        let Some(slot) = usize::try_from(line)
            .ok()
            .and_then(|line| line.checked_sub(1))
            .and_then(|index| lines.get_mut(index))
        else {
            return;
        };
        *slot = text;
        let edited = lines.join("\n");
        state.content = edited;
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lock_state()
            .content
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn save(&self) -> Result<(), SurfaceError> {
        let mut state = self.lock_state();
        if let Some(path) = &self.path {
            fs::write(path, &state.content).map_err(|source| SurfaceError::Write {
                path: path.clone(),
                source,
            })?;
        }
        state.saved_content = state.content.clone();
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EditingSurface for BufferSurface {
    fn is_saved(&self) -> bool {
        let state = self.lock_state();
        state.content == state.saved_content
    }

    fn content(&self) -> String {
        self.lock_state().content.clone()
    }

    fn set_content(&self, content: &str) {
        self.lock_state().content = content.to_string();
    }

    fn formatted_target(&self) -> PlSchema {
        let schema = infer_schema(&self.content());
        match &self.package_name {
            Some(package) if schema.kind.is_subprogram() => schema.with_package(package.clone()),
            _ => schema,
        }
    }
}
