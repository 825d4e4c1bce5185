//! Print job descriptors.
//!
//! A print is a directory of sliced layer files; the slices themselves
//! are opaque to this crate. The slice queue tracks which layers have
//! been marked so a paused or cancelled job can pick up where it left
//! off.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One print job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintModel {
    /// Stable job id
    pub id: String,
    /// Human-readable job name
    pub name: String,
    /// Directory the layer files came from
    pub directory: PathBuf,
    /// When the job was created host-side
    pub created_at: DateTime<Utc>,
    /// When marking first started, if it has
    pub started_at: Option<DateTime<Utc>>,
    /// When the last layer finished, if it has
    pub finished_at: Option<DateTime<Utc>>,
    /// Whether every layer has been marked
    pub complete: bool,
}

impl PrintModel {
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            directory: directory.into(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            complete: false,
        }
    }
}

/// One sliced layer of a print job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceModel {
    /// Stable slice id
    pub id: String,
    /// The job this slice belongs to
    pub print_id: String,
    /// Zero-based layer number
    pub layer: u32,
    /// Path to the layer file handed to the laser
    pub file_path: PathBuf,
    /// Whether the laser has marked this layer
    pub marked: bool,
    /// When the layer was marked, if it has been
    pub marked_at: Option<DateTime<Utc>>,
}

/// Ordered slice list with mark bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SliceQueue {
    slices: Vec<SliceModel>,
}

impl SliceQueue {
    pub fn new(slices: Vec<SliceModel>) -> Self {
        Self { slices }
    }

    /// Build a queue for a print from its layer files, in the order
    /// given.
    pub fn for_print(print: &PrintModel, layer_files: &[PathBuf]) -> Self {
        let slices = layer_files
            .iter()
            .enumerate()
            .map(|(layer, path)| SliceModel {
                id: Uuid::new_v4().to_string(),
                print_id: print.id.clone(),
                layer: layer as u32,
                file_path: path.clone(),
                marked: false,
                marked_at: None,
            })
            .collect();
        Self { slices }
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn slices(&self) -> &[SliceModel] {
        &self.slices
    }

    /// The next layer awaiting the laser, if any.
    pub fn next_unmarked(&self) -> Option<&SliceModel> {
        self.slices.iter().find(|s| !s.marked)
    }

    /// Record that a slice has been marked. Returns the updated slice,
    /// or `None` for an unknown id.
    pub fn mark(&mut self, slice_id: &str) -> Option<SliceModel> {
        let slice = self.slices.iter_mut().find(|s| s.id == slice_id)?;
        slice.marked = true;
        slice.marked_at = Some(Utc::now());
        Some(slice.clone())
    }

    pub fn marked_count(&self) -> usize {
        self.slices.iter().filter(|s| s.marked).count()
    }

    pub fn all_marked(&self) -> bool {
        self.slices.iter().all(|s| s.marked)
    }
}

/// Convenience: numbered layer file paths `layer_0000.png`, ... under a
/// job directory.
pub fn numbered_layer_files(directory: &Path, count: u32) -> Vec<PathBuf> {
    (0..count)
        .map(|i| directory.join(format!("layer_{:04}.png", i)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_tracks_marks_in_layer_order() {
        let print = PrintModel::new("bracket", "/tmp/bracket");
        let files = numbered_layer_files(Path::new("/tmp/bracket"), 3);
        let mut queue = SliceQueue::for_print(&print, &files);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.next_unmarked().unwrap().layer, 0);

        let first = queue.next_unmarked().unwrap().id.clone();
        let marked = queue.mark(&first).unwrap();
        assert!(marked.marked);
        assert!(marked.marked_at.is_some());
        assert_eq!(queue.next_unmarked().unwrap().layer, 1);
        assert_eq!(queue.marked_count(), 1);
        assert!(!queue.all_marked());
    }

    #[test]
    fn marking_an_unknown_id_is_a_noop() {
        let print = PrintModel::new("bracket", "/tmp/bracket");
        let mut queue = SliceQueue::for_print(&print, &numbered_layer_files(Path::new("/t"), 1));
        assert!(queue.mark("nope").is_none());
        assert_eq!(queue.marked_count(), 0);
    }

    #[test]
    fn empty_queue_is_already_complete() {
        let queue = SliceQueue::default();
        assert!(queue.is_empty());
        assert!(queue.all_marked());
        assert!(queue.next_unmarked().is_none());
    }
}
