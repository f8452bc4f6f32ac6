/// Component registry and overlay interaction state
///
/// In dev mode every annotatable component registers itself with its id,
/// display name, DOM path and current bounding rect. The overlay resolves
/// pointer positions to components, tracks which one is hovered and which
/// one is selected, and turns the selection into a change request.
///
/// ```
/// use foundry_shared::models::change::PageContext;
/// use foundry_shared::overlay::geometry::{Point, Rect};
/// use foundry_shared::overlay::registry::{ComponentRegistry, RegisteredComponent};
///
/// let mut registry = ComponentRegistry::new();
/// registry
///     .register(RegisteredComponent::new("hero", "Hero", "main > section".parse().unwrap(), Rect::new(0.0, 0.0, 800.0, 400.0)))
///     .unwrap();
/// registry
///     .register(RegisteredComponent::new("cta", "CallToAction", "main > section > button".parse().unwrap(), Rect::new(40.0, 300.0, 120.0, 40.0)))
///     .unwrap();
///
/// // The innermost component under the pointer wins
/// assert_eq!(registry.hover_at(Point::new(50.0, 310.0)), Some("cta"));
///
/// registry.select("cta").unwrap();
/// let draft = registry
///     .draft_for_selection(PageContext::new("http://localhost:3000/"))
///     .unwrap()
///     .feedback("Make the button larger");
/// let change = draft.build().unwrap();
/// assert_eq!(change.component_id, "cta");
/// ```

use serde::Serialize;
use serde_json::Value;

use super::dom_path::DomPath;
use super::geometry::{Point, Rect};
use crate::models::change::{
    ChangeCategory, ChangeError, ChangePriority, ComponentContext, CreateChange, PageContext,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Component already registered: {0}")]
    Duplicate(String),

    #[error("Unknown component: {0}")]
    NotFound(String),

    #[error("Invalid bounding rect for component {0}")]
    InvalidRect(String),

    #[error("No component is selected")]
    NothingSelected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisteredComponent {
    pub id: String,

    /// Component name as shown in the overlay
    pub name: String,

    pub dom_path: DomPath,
    pub rect: Rect,
    pub props: Option<Value>,
}

impl RegisteredComponent {
    pub fn new(id: &str, name: &str, dom_path: DomPath, rect: Rect) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            dom_path,
            rect,
            props: None,
        }
    }

    pub fn with_props(mut self, props: Value) -> Self {
        self.props = Some(props);
        self
    }

    pub fn context(&self) -> ComponentContext {
        ComponentContext {
            component_name: self.name.clone(),
            dom_path: self.dom_path.to_string(),
            bounding_rect: self.rect,
            props: self.props.clone(),
        }
    }
}

/// Registered components plus hover and selection state
///
/// Components are kept in registration order.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: Vec<RegisteredComponent>,
    hovered: Option<String>,
    selected: Option<String>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredComponent> {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredComponent> {
        self.components.iter()
    }

    fn require(&self, id: &str) -> Result<&RegisteredComponent, RegistryError> {
        self.get(id).ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn register(&mut self, component: RegisteredComponent) -> Result<(), RegistryError> {
        if self.get(&component.id).is_some() {
            return Err(RegistryError::Duplicate(component.id));
        }
        if !component.rect.is_valid() {
            return Err(RegistryError::InvalidRect(component.id));
        }

        tracing::trace!(id = %component.id, name = %component.name, "Component registered");
        self.components.push(component);
        Ok(())
    }

    /// Removes a component, dropping hover and selection that point at it
    pub fn unregister(&mut self, id: &str) -> Option<RegisteredComponent> {
        let position = self.components.iter().position(|c| c.id == id)?;

        if self.hovered.as_deref() == Some(id) {
            self.hovered = None;
        }
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }

        Some(self.components.remove(position))
    }

    /// Records a new bounding rect after layout or scroll
    pub fn update_rect(&mut self, id: &str, rect: Rect) -> Result<(), RegistryError> {
        if !rect.is_valid() {
            return Err(RegistryError::InvalidRect(id.to_string()));
        }

        let component = self
            .components
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        component.rect = rect;
        Ok(())
    }

    /// Innermost component containing `point`
    ///
    /// "Innermost" is the smallest area; on a tie the later registration wins.
    pub fn hit_test(&self, point: Point) -> Option<&RegisteredComponent> {
        self.components
            .iter()
            .filter(|c| c.rect.contains(point))
            .fold(None, |best: Option<&RegisteredComponent>, candidate| match best {
                Some(current) if current.rect.area() < candidate.rect.area() => Some(current),
                _ => Some(candidate),
            })
    }

    pub fn hovered(&self) -> Option<&str> {
        self.hovered.as_deref()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn hover(&mut self, id: &str) -> Result<(), RegistryError> {
        self.require(id)?;
        self.hovered = Some(id.to_string());
        Ok(())
    }

    /// Hovers whatever is under `point`, clearing hover over empty space
    pub fn hover_at(&mut self, point: Point) -> Option<&str> {
        self.hovered = self.hit_test(point).map(|c| c.id.clone());
        self.hovered.as_deref()
    }

    pub fn clear_hover(&mut self) {
        self.hovered = None;
    }

    /// Selects `id`, or deselects it if it already is selected
    ///
    /// Returns whether `id` is selected afterwards.
    pub fn select(&mut self, id: &str) -> Result<bool, RegistryError> {
        self.require(id)?;

        if self.selected.as_deref() == Some(id) {
            self.selected = None;
            Ok(false)
        } else {
            self.selected = Some(id.to_string());
            Ok(true)
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn component_context(&self, id: &str) -> Option<ComponentContext> {
        self.get(id).map(RegisteredComponent::context)
    }

    /// Starts a change request for the selected component
    pub fn draft_for_selection(&self, page: PageContext) -> Result<ChangeDraft, RegistryError> {
        let id = self.selected.as_deref().ok_or(RegistryError::NothingSelected)?;
        let component = self.require(id)?;

        Ok(ChangeDraft::new(&component.id, component.context(), page))
    }
}

/// Change request being filled in from the overlay popover
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeDraft {
    component_id: String,
    feedback: String,
    category: ChangeCategory,
    priority: ChangePriority,
    component_context: ComponentContext,
    page_context: PageContext,
}

impl ChangeDraft {
    pub fn new(component_id: &str, component_context: ComponentContext, page_context: PageContext) -> Self {
        Self {
            component_id: component_id.to_string(),
            feedback: String::new(),
            category: ChangeCategory::default(),
            priority: ChangePriority::default(),
            component_context,
            page_context,
        }
    }

    pub fn feedback(mut self, feedback: &str) -> Self {
        self.feedback = feedback.to_string();
        self
    }

    pub fn category(mut self, category: ChangeCategory) -> Self {
        self.category = category;
        self
    }

    pub fn priority(mut self, priority: ChangePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Validated payload for submission
    pub fn build(self) -> Result<CreateChange, ChangeError> {
        let change = CreateChange {
            component_id: self.component_id,
            feedback: self.feedback,
            category: Some(self.category),
            priority: Some(self.priority),
            component_context: self.component_context,
            page_context: self.page_context,
        };
        change.validate()?;
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn component(id: &str, rect: Rect) -> RegisteredComponent {
        RegisteredComponent::new(id, id, format!("main > div#{}", id).parse().unwrap(), rect)
    }

    fn registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry.register(component("page", Rect::new(0.0, 0.0, 1000.0, 800.0))).unwrap();
        registry.register(component("card", Rect::new(100.0, 100.0, 300.0, 200.0))).unwrap();
        registry.register(component("button", Rect::new(120.0, 250.0, 80.0, 30.0))).unwrap();
        registry
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut registry = registry();
        let err = registry
            .register(component("card", Rect::new(0.0, 0.0, 1.0, 1.0)))
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("card".to_string()));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_invalid_rect_rejected() {
        let mut registry = ComponentRegistry::new();
        assert!(matches!(
            registry.register(component("x", Rect::new(0.0, 0.0, -5.0, 5.0))),
            Err(RegistryError::InvalidRect(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_hit_test_picks_innermost() {
        let registry = registry();
        assert_eq!(registry.hit_test(Point::new(130.0, 260.0)).unwrap().id, "button");
        assert_eq!(registry.hit_test(Point::new(350.0, 120.0)).unwrap().id, "card");
        assert_eq!(registry.hit_test(Point::new(900.0, 700.0)).unwrap().id, "page");
        assert!(registry.hit_test(Point::new(1200.0, 10.0)).is_none());
    }

    #[test]
    fn test_hit_test_tie_prefers_later_registration() {
        let mut registry = ComponentRegistry::new();
        registry.register(component("outer", Rect::new(0.0, 0.0, 50.0, 50.0))).unwrap();
        registry.register(component("inner", Rect::new(0.0, 0.0, 50.0, 50.0))).unwrap();
        assert_eq!(registry.hit_test(Point::new(10.0, 10.0)).unwrap().id, "inner");
    }

    #[test]
    fn test_hover() {
        let mut registry = registry();
        assert_eq!(registry.hover_at(Point::new(130.0, 260.0)), Some("button"));
        assert_eq!(registry.hovered(), Some("button"));

        assert_eq!(registry.hover_at(Point::new(5000.0, 5000.0)), None);
        assert_eq!(registry.hovered(), None);

        registry.hover("card").unwrap();
        assert_eq!(registry.hovered(), Some("card"));
        assert!(registry.hover("missing").is_err());

        registry.clear_hover();
        assert_eq!(registry.hovered(), None);
    }

    #[test]
    fn test_select_toggles() {
        let mut registry = registry();
        assert!(registry.select("card").unwrap());
        assert_eq!(registry.selected(), Some("card"));

        assert!(registry.select("button").unwrap());
        assert_eq!(registry.selected(), Some("button"));

        assert!(!registry.select("button").unwrap());
        assert_eq!(registry.selected(), None);

        assert_eq!(
            registry.select("nope"),
            Err(RegistryError::NotFound("nope".to_string()))
        );
    }

    #[test]
    fn test_unregister_clears_state() {
        let mut registry = registry();
        registry.hover("button").unwrap();
        registry.select("button").unwrap();

        let removed = registry.unregister("button").unwrap();
        assert_eq!(removed.id, "button");
        assert_eq!(registry.hovered(), None);
        assert_eq!(registry.selected(), None);
        assert!(registry.unregister("button").is_none());

        registry.select("card").unwrap();
        registry.unregister("page");
        assert_eq!(registry.selected(), Some("card"));
    }

    #[test]
    fn test_update_rect() {
        let mut registry = registry();
        registry
            .update_rect("button", Rect::new(600.0, 600.0, 10.0, 10.0))
            .unwrap();
        assert_eq!(registry.hit_test(Point::new(605.0, 605.0)).unwrap().id, "button");

        assert!(registry.update_rect("ghost", Rect::default()).is_err());
        assert!(matches!(
            registry.update_rect("button", Rect::new(f64::NAN, 0.0, 1.0, 1.0)),
            Err(RegistryError::InvalidRect(_))
        ));
    }

    #[test]
    fn test_component_context() {
        let mut registry = ComponentRegistry::new();
        registry
            .register(
                component("nav", Rect::new(0.0, 0.0, 100.0, 40.0)).with_props(json!({ "sticky": true })),
            )
            .unwrap();

        let context = registry.component_context("nav").unwrap();
        assert_eq!(context.component_name, "nav");
        assert_eq!(context.dom_path, "main > div#nav");
        assert_eq!(context.bounding_rect, Rect::new(0.0, 0.0, 100.0, 40.0));
        assert_eq!(context.props, Some(json!({ "sticky": true })));
        assert!(registry.component_context("other").is_none());
    }

    #[test]
    fn test_draft_requires_selection() {
        let registry = registry();
        assert_eq!(
            registry
                .draft_for_selection(PageContext::new("http://localhost/"))
                .unwrap_err(),
            RegistryError::NothingSelected
        );
    }

    #[test]
    fn test_draft_builds_change() {
        let mut registry = registry();
        registry.select("card").unwrap();

        let change = registry
            .draft_for_selection(PageContext::new("http://localhost:3000/pricing"))
            .unwrap()
            .feedback("Typo in the heading")
            .category(ChangeCategory::Content)
            .priority(ChangePriority::High)
            .build()
            .unwrap();

        assert_eq!(change.component_id, "card");
        assert_eq!(change.category, Some(ChangeCategory::Content));
        assert_eq!(change.priority, Some(ChangePriority::High));
        assert_eq!(change.component_context.dom_path, "main > div#card");
        assert_eq!(change.page_context.url, "http://localhost:3000/pricing");
    }

    #[test]
    fn test_draft_without_feedback_is_invalid() {
        let mut registry = registry();
        registry.select("card").unwrap();

        let result = registry
            .draft_for_selection(PageContext::new("http://localhost/"))
            .unwrap()
            .build();
        assert!(matches!(result, Err(ChangeError::Validation { .. })));
    }
}
