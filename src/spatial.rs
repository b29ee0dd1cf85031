use crate::common::{AssetReference, Placement};
use crate::error::ServiceError;
use crate::ports::SpatialPlacer;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Node name given to content attached by the asset loader
pub const LOADED_MODEL_NODE: &str = "LoadedModel";

#[derive(Debug, Clone, PartialEq)]
pub struct AttachedContent {
    pub name: String,
    pub source: AssetReference,
    pub attached_at: DateTime<Utc>,
}

#[derive(Debug)]
struct AnchorNode {
    placement: Placement,
    attachments: Vec<AttachedContent>,
    cleared: bool,
}

/// Attachment point in the environment. Cloning shares the same anchor.
#[derive(Debug, Clone)]
pub struct AnchorHandle {
    id: Uuid,
    node: Arc<RwLock<AnchorNode>>,
}

impl AnchorHandle {
    fn new(placement: Placement) -> Self {
        Self {
            id: Uuid::new_v4(),
            node: Arc::new(RwLock::new(AnchorNode {
                placement,
                attachments: Vec::new(),
                cleared: false,
            })),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn placement(&self) -> Placement {
        self.node
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .placement
    }

    pub fn is_cleared(&self) -> bool {
        self.node
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cleared
    }

    pub fn attachments(&self) -> Vec<AttachedContent> {
        self.node
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .attachments
            .clone()
    }

    /// Parent content under this anchor. Fails once the anchor has been cleared.
    pub fn attach(&self, content: AttachedContent) -> Result<(), ServiceError> {
        let mut node = self.node.write().unwrap_or_else(PoisonError::into_inner);
        if node.cleared {
            return Err(ServiceError::Rejected(format!(
                "anchor {} has been cleared",
                self.id
            )));
        }
        debug!("Attaching '{}' to anchor {}", content.name, self.id);
        node.attachments.push(content);
        Ok(())
    }

    fn reposition(&self, placement: Placement) {
        self.node
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .placement = placement;
    }

    fn destroy(&self) {
        let mut node = self.node.write().unwrap_or_else(PoisonError::into_inner);
        node.attachments.clear();
        node.cleared = true;
    }
}

impl PartialEq for AnchorHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Keeps at most one anchor alive: the first placement creates it, later ones move it.
#[derive(Debug, Default)]
pub struct SingleAnchorPlacer {
    anchor: Mutex<Option<AnchorHandle>>,
    created: Mutex<usize>,
}

impl SingleAnchorPlacer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<AnchorHandle> {
        self.anchor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of anchors created over the placer's lifetime
    pub fn anchors_created(&self) -> usize {
        *self.created.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SpatialPlacer for SingleAnchorPlacer {
    fn place(&self, placement: Placement) -> AnchorHandle {
        let mut slot = self.anchor.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(anchor) => {
                anchor.reposition(placement);
                debug!("Repositioned anchor {}", anchor.id());
                anchor.clone()
            }
            None => {
                let anchor = AnchorHandle::new(placement);
                *self.created.lock().unwrap_or_else(PoisonError::into_inner) += 1;
                info!("Created anchor {}", anchor.id());
                *slot = Some(anchor.clone());
                anchor
            }
        }
    }

    fn clear(&self) {
        if let Some(anchor) = self
            .anchor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            anchor.destroy();
            info!("Cleared anchor {}", anchor.id());
        }
    }
}
