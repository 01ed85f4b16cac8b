use std::collections::BTreeMap;
use std::path::PathBuf;

use rand::seq::SliceRandom;
use rand::Rng;

/// Dimensions every simulated catalog starts with.
pub const DIMENSIONS: [&str; 3] = ["Genre", "Format", "Owner"];

/// Values each dimension can take.
pub const VALUES_PER_DIMENSION: usize = 4;

/// Tag value `value` of dimension `dim`, e.g. `g2` or `f1`.
///
/// The last value is spelled the same in every dimension, so views over
/// different dimensions end up sharing a directory.
pub fn tag_value(dim: usize, value: usize) -> String {
    if value + 1 == VALUES_PER_DIMENSION {
        return "common".to_string();
    }
    let initial = DIMENSIONS[dim]
        .chars()
        .next()
        .map(|c| c.to_ascii_lowercase())
        .unwrap_or('x');
    format!("{}{}", initial, value + 1)
}

/// An operation the simulation can perform.
#[derive(Debug, Clone)]
pub enum Op {
    AddFile {
        name: String,
        tags: Vec<(usize, usize)>,
    },
    Tag {
        file_id: String,
        dim: usize,
        value: usize,
    },
    Untag {
        file_id: String,
        dim: usize,
    },
    SetEligible {
        file_id: String,
        eligible: bool,
    },
    /// Delete the source file and its catalog record.
    RemoveSource {
        file_id: String,
    },
    /// Move a source inside the workspace, either by rename or by copy and delete.
    MoveFile {
        file_id: String,
        copy: bool,
    },
    SaveView {
        view_id: String,
        chain: Vec<(usize, usize)>,
    },
    DeleteView {
        view_id: String,
    },
    RenameView {
        view_id: String,
        name: String,
    },
    Reconcile,
    MaterializeAll,
}

/// What the generator knows about the simulated workspace.
#[derive(Debug, Default)]
pub struct OpState {
    /// File id -> current source path.
    pub files: BTreeMap<String, PathBuf>,
    pub view_ids: Vec<String>,
    pub file_counter: usize,
    pub move_counter: usize,
}

impl OpState {
    /// A fresh source path; base names repeat so links collide by name.
    pub fn next_file_name(&mut self) -> String {
        self.file_counter += 1;
        format!("in{}/file{}.txt", self.file_counter, self.file_counter % 4)
    }

    pub fn next_move_dir(&mut self) -> PathBuf {
        self.move_counter += 1;
        PathBuf::from(format!("moved{}", self.move_counter))
    }

    fn pick_file(&self, rng: &mut impl Rng) -> Option<String> {
        let ids: Vec<&String> = self.files.keys().collect();
        ids.choose(rng).map(|id| (*id).clone())
    }
}

fn random_tags(rng: &mut impl Rng, max: usize) -> Vec<(usize, usize)> {
    let mut dims: Vec<usize> = (0..DIMENSIONS.len()).collect();
    dims.shuffle(rng);
    let count = rng.gen_range(0..=max.min(dims.len()));
    dims.into_iter()
        .take(count)
        .map(|dim| (dim, rng.gen_range(0..VALUES_PER_DIMENSION)))
        .collect()
}

/// Generate the next operation.
pub fn generate(rng: &mut impl Rng, state: &mut OpState) -> Op {
    let file = state.pick_file(rng);
    let view = state.view_ids.choose(rng).cloned();

    match (rng.gen_range(0..100), file, view) {
        (0..=19, _, _) | (_, None, _) => Op::AddFile {
            name: state.next_file_name(),
            tags: random_tags(rng, 3),
        },
        (20..=34, Some(file_id), _) => Op::Tag {
            file_id,
            dim: rng.gen_range(0..DIMENSIONS.len()),
            value: rng.gen_range(0..VALUES_PER_DIMENSION),
        },
        (35..=41, Some(file_id), _) => Op::Untag {
            file_id,
            dim: rng.gen_range(0..DIMENSIONS.len()),
        },
        (42..=45, Some(file_id), _) => Op::SetEligible {
            file_id,
            eligible: rng.gen_bool(0.5),
        },
        (46..=48, Some(file_id), _) => Op::RemoveSource { file_id },
        (49..=56, Some(file_id), _) => Op::MoveFile {
            file_id,
            copy: rng.gen_bool(0.5),
        },
        (57..=61, _, Some(view_id)) => Op::DeleteView { view_id },
        (62..=64, _, Some(view_id)) => Op::RenameView {
            name: format!("{} renamed", view_id),
            view_id,
        },
        (65..=89, _, existing) => {
            let mut chain = random_tags(rng, 3);
            if chain.is_empty() {
                chain.push((rng.gen_range(0..DIMENSIONS.len()), rng.gen_range(0..VALUES_PER_DIMENSION)));
            }
            // Half the time re-save a stored view, usually with a new chain.
            let view_id = match existing {
                Some(id) if rng.gen_bool(0.5) => id,
                _ => format!("v{}", rng.gen_range(0..6)),
            };
            Op::SaveView { view_id, chain }
        }
        (90..=96, _, _) => Op::Reconcile,
        _ => Op::MaterializeAll,
    }
}
