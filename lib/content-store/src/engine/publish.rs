//! Publish-state derivation, flag maintenance and tag synchronization.

use crate::model::{Document, PublishIntent, PublishedState};
use crate::rows::DocumentRow;
use crate::{Aggregate, ContentError, ContentRepository, Query, TransactionExecutor};

use super::tree::path_ids;

/// State of a document persisted for the first time.
pub(crate) fn new_document_state(intent: PublishIntent) -> Result<PublishedState, ContentError> {
    match intent {
        PublishIntent::Save => Ok(PublishedState::Saving),
        PublishIntent::Publish => Ok(PublishedState::Publishing),
        PublishIntent::Unpublish => Err(ContentError::InvalidArgument(
            "cannot unpublish a document that was never stored".to_string(),
        )),
    }
}

/// Resolve the intent against the stored flags.
///
/// Publishing what is already the published newest version with no content
/// edits is a no-op publish and stays steady.
pub(crate) fn derive_state(
    intent: PublishIntent,
    newest_published: bool,
    has_published: bool,
    content_changed: bool,
) -> PublishedState {
    match intent {
        PublishIntent::Publish if newest_published && !content_changed => PublishedState::Published,
        PublishIntent::Publish => PublishedState::Publishing,
        PublishIntent::Unpublish if has_published => PublishedState::Unpublishing,
        PublishIntent::Unpublish => PublishedState::Unpublished,
        PublishIntent::Save if content_changed => PublishedState::Saving,
        PublishIntent::Save if newest_published => PublishedState::Published,
        PublishIntent::Save => PublishedState::Unpublished,
    }
}

/// Whether every version row of the node loses its published flag first.
pub(crate) fn clears_published(state: PublishedState, content_type_changed: bool) -> bool {
    state.is_transition() || content_type_changed
}

/// Published flag of the row written by this persist.
///
/// Steady states keep the flag the target row already carries.
pub(crate) fn written_published_flag(
    state: PublishedState,
    content_type_reset: bool,
    target_published: bool,
) -> bool {
    if content_type_reset {
        return false;
    }
    match state {
        PublishedState::Publishing => true,
        PublishedState::Published => target_published,
        PublishedState::Saving | PublishedState::Unpublishing | PublishedState::Unpublished => false,
    }
}

impl ContentRepository {
    /// Clear the published flag on every version row of `node_id`.
    /// Returns the number of rows changed.
    pub async fn clear_published_flag<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        node_id: i64,
    ) -> Result<u64, ContentError> {
        let rows = tx
            .fetch(
                Query::<DocumentRow>::new()
                    .eq("node_id", node_id)
                    .eq("published", true),
            )
            .await?;

        let mut changed = 0;
        for mut row in rows {
            row.published = false;
            changed += tx.update(&row).await?;
        }
        Ok(changed)
    }

    /// Clear the newest flag on every version row of `node_id`.
    pub async fn clear_newest_flag<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        node_id: i64,
    ) -> Result<u64, ContentError> {
        let rows = tx
            .fetch(
                Query::<DocumentRow>::new()
                    .eq("node_id", node_id)
                    .eq("newest", true),
            )
            .await?;

        let mut changed = 0;
        for mut row in rows {
            row.newest = false;
            changed += tx.update(&row).await?;
        }
        Ok(changed)
    }

    /// True when the document and every ancestor up to the root have a
    /// published version. Nothing in the recycle bin is path-published.
    pub async fn is_path_published<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        document: &Document,
    ) -> Result<bool, ContentError> {
        if document.path.starts_with(&self.config.recycle_bin_prefix()) {
            return Ok(false);
        }
        if document.parent_id == self.config.root_id {
            return Ok(document.has_published_version());
        }

        let ids = path_ids(&document.path, self.config.root_id);
        if ids.is_empty() {
            return Ok(false);
        }

        let published = tx
            .aggregate(
                Query::<DocumentRow>::new()
                    .r#in("node_id", ids)
                    .eq("published", true),
                Aggregate::Count,
            )
            .await?
            .unwrap_or(0);

        Ok(published == i64::from(document.level))
    }

    /// Bring the tag index in line with the state just persisted.
    ///
    /// A publish that also retypes the document to a type without tag
    /// properties leaves the previous type's tags in the index.
    pub(crate) async fn sync_tags<X: TransactionExecutor>(
        &self,
        tx: &mut X,
        document: &Document,
        state: PublishedState,
        content_type_reset: bool,
    ) -> Result<(), ContentError> {
        // A retyped document loses its tags whatever the new type declares
        if content_type_reset {
            self.tags.clear_tags_for(document).await?;
            return Ok(());
        }
        if !document.content_type.has_tag_property() {
            return Ok(());
        }

        let index = match state {
            PublishedState::Saving => return Ok(()),
            PublishedState::Unpublishing => false,
            PublishedState::Publishing
            | PublishedState::Published
            | PublishedState::Unpublished => self.is_path_published(tx, document).await?,
        };

        if index {
            self.tags.update_tags_for(document).await?;
        } else {
            self.tags.clear_tags_for(document).await?;
        }
        tracing::trace!(node_id = document.id, ?state, index, "synchronized tags");
        Ok(())
    }
}
