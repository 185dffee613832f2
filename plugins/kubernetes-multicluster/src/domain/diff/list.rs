//! Manifest-set diff grouped by resource key.

use std::cmp::Ordering;
use std::fmt::Write as _;

use super::{diff_manifests, DiffOptions, DiffResult, Renderer};
use crate::domain::manifest::Manifest;

#[derive(Debug, Clone, PartialEq)]
pub struct DiffListChange {
    pub old: Manifest,
    pub new: Manifest,
    pub diff: DiffResult,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffListResult {
    pub adds: Vec<Manifest>,
    pub deletes: Vec<Manifest>,
    pub changes: Vec<DiffListChange>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiffRenderOptions {
    pub mask_secret: bool,
    pub mask_config_map: bool,
    /// Zero renders every changed manifest.
    pub max_changed_manifests: usize,
}

/// Pair `olds` and `news` by normalized key. Unpaired news are adds, unpaired
/// olds are deletes, and pairs whose bodies differ are changes.
#[must_use]
pub fn diff_list(olds: &[Manifest], news: &[Manifest], options: DiffOptions) -> DiffListResult {
    fn sorted(manifests: &[Manifest]) -> Vec<(String, &Manifest)> {
        let mut keyed: Vec<(String, &Manifest)> = manifests
            .iter()
            .map(|m| (m.key().normalize().to_string(), m))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed
    }
    let olds = sorted(olds);
    let news = sorted(news);

    let mut result = DiffListResult::default();
    let (mut o, mut n) = (0, 0);
    while o < olds.len() && n < news.len() {
        let (old_key, old) = &olds[o];
        let (new_key, new) = &news[n];
        match new_key.cmp(old_key) {
            Ordering::Equal => {
                let diff = diff_manifests(old, new, options);
                if diff.has_diff() {
                    result.changes.push(DiffListChange {
                        old: (*old).clone(),
                        new: (*new).clone(),
                        diff,
                    });
                }
                o += 1;
                n += 1;
            }
            Ordering::Less => {
                result.adds.push((*new).clone());
                n += 1;
            }
            Ordering::Greater => {
                result.deletes.push((*old).clone());
                o += 1;
            }
        }
    }
    result
        .adds
        .extend(news[n..].iter().map(|(_, m)| (*m).clone()));
    result
        .deletes
        .extend(olds[o..].iter().map(|(_, m)| (*m).clone()));
    result
}

impl DiffListResult {
    #[must_use]
    pub fn no_changes(&self) -> bool {
        self.total_out_of_sync() == 0
    }

    #[must_use]
    pub fn total_out_of_sync(&self) -> usize {
        self.adds.len() + self.deletes.len() + self.changes.len()
    }

    #[must_use]
    pub fn render(&self, options: DiffRenderOptions) -> String {
        let mut out = String::new();
        let mut index = 0;
        for deleted in &self.deletes {
            index += 1;
            let _ = write!(out, "- {index}. {}\n\n", deleted.key().readable_string());
        }
        for added in &self.adds {
            index += 1;
            let _ = write!(out, "+ {index}. {}\n\n", added.key().readable_string());
        }

        let shown = match options.max_changed_manifests {
            0 => self.changes.len(),
            max => max.min(self.changes.len()),
        };
        for change in &self.changes[..shown] {
            let key = change.old.key();
            let mut renderer = Renderer::new().with_left_padding(1);
            if (options.mask_secret && key.is_secret())
                || (options.mask_config_map && key.is_config_map())
            {
                renderer = renderer.with_mask_path("data");
            }
            index += 1;
            let _ = write!(out, "# {index}. {}\n\n", key.readable_string());
            out.push_str(&renderer.render(change.diff.nodes()));
            out.push('\n');
        }

        if shown < self.changes.len() {
            let _ = writeln!(
                out,
                "... (omitted {} other changed manifests)",
                self.changes.len() - shown
            );
        }
        out
    }
}
