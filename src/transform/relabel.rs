//! Fresh labels for copied code.
//!
//! Splicing the same body into a builder twice, or into a builder that already uses the
//! body's labels, would place each label more than once. [`LabelRelabeler`] maps every
//! label of the replayed body to a label newly allocated from the destination builder,
//! consistently for marks and references within one pass.

use rustc_hash::FxHashMap;

use crate::{
    code::instruction::{CodeElement, Label},
    transform::{builder::CodeBuilder, CodeTransform, ElementBuilder, Stage},
    Result,
};

/// Gives every replayed body its own set of destination labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelRelabeler;

struct RelabelStage {
    labels: FxHashMap<Label, Label>,
}

impl Stage<CodeBuilder> for RelabelStage {
    fn accept(&mut self, builder: &mut CodeBuilder, element: CodeElement) -> Result<()> {
        let labels = &mut self.labels;
        let relabeled = element.map_labels(|label| {
            *labels.entry(label).or_insert_with(|| builder.new_label())
        });
        builder.with(relabeled);
        Ok(())
    }
}

impl LabelRelabeler {
    /// Create a relabeler.
    #[must_use]
    pub fn of() -> Self {
        LabelRelabeler
    }

    /// A code transform mapping labels freshly on every pass.
    #[must_use]
    pub fn as_code_transform(&self) -> CodeTransform {
        CodeTransform::stateful(|| RelabelStage {
            labels: FxHashMap::default(),
        })
    }
}

impl From<LabelRelabeler> for CodeTransform {
    fn from(relabeler: LabelRelabeler) -> Self {
        relabeler.as_code_transform()
    }
}
