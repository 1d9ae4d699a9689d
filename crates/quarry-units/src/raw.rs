//! Pass-through unit: offers the target payload itself as result data.

use std::sync::Arc;

use quarry_engine::{Case, Cases, Data, Error, Manager, Result, Target, Unit};

/// Registers the raw target payload as data exactly once, so every seeded
/// target is flag-searched even when no decoder applies.
pub struct Raw {
    target: Arc<Target>,
}

impl Raw {
    /// Offer a unit for any non-empty target.
    pub fn applicable(_manager: &Manager, target: &Arc<Target>) -> Option<Arc<dyn Unit>> {
        if target.payload().is_empty() {
            return None;
        }
        Some(Arc::new(Self {
            target: target.clone(),
        }))
    }
}

impl Unit for Raw {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn priority(&self) -> i32 {
        35
    }

    fn protected_recurse(&self) -> bool {
        true
    }

    fn target(&self) -> &Arc<Target> {
        &self.target
    }

    fn enumerate(&self) -> Result<Cases> {
        Ok(Box::new(std::iter::once(Box::new(()) as Case)))
    }

    fn evaluate(self: Arc<Self>, manager: &Manager, case: Case) -> Result<()> {
        case.downcast::<()>()
            .map_err(|_| Error::Unit("raw: unexpected case type".into()))?;

        let unit: Arc<dyn Unit> = self.clone();
        manager.register_data(&unit, Data::from(self.target.payload()), false);
        Ok(())
    }
}
