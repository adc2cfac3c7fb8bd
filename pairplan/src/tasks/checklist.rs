//! Checklist editing on a task.

use pairplan_proto::task::{ChecklistItem, Task};

use super::TaskError;

fn item_mut<'a>(task: &'a mut Task, item_id: &str) -> Result<&'a mut ChecklistItem, TaskError> {
    task.checklist
        .iter_mut()
        .find(|i| i.id == item_id)
        .ok_or_else(|| TaskError::ChecklistItemNotFound(item_id.to_string()))
}

/// Appends a new unticked item and returns its id.
///
/// # Errors
///
/// Returns [`TaskError::ChecklistTextEmpty`] for blank text.
pub fn add_item(task: &mut Task, text: &str) -> Result<String, TaskError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(TaskError::ChecklistTextEmpty);
    }
    let item = ChecklistItem::new(text);
    let id = item.id.clone();
    task.checklist.push(item);
    Ok(id)
}

/// Flips an item's completion and returns the new value.
///
/// # Errors
///
/// Returns [`TaskError::ChecklistItemNotFound`] if no item has `item_id`.
pub fn toggle_item(task: &mut Task, item_id: &str) -> Result<bool, TaskError> {
    let item = item_mut(task, item_id)?;
    item.is_completed = !item.is_completed;
    Ok(item.is_completed)
}

/// Removes an item.
///
/// # Errors
///
/// Returns [`TaskError::ChecklistItemNotFound`] if no item has `item_id`.
pub fn remove_item(task: &mut Task, item_id: &str) -> Result<ChecklistItem, TaskError> {
    let idx = task
        .checklist
        .iter()
        .position(|i| i.id == item_id)
        .ok_or_else(|| TaskError::ChecklistItemNotFound(item_id.to_string()))?;
    Ok(task.checklist.remove(idx))
}

/// Replaces an item's text.
///
/// # Errors
///
/// Returns [`TaskError::ChecklistTextEmpty`] for blank text or
/// [`TaskError::ChecklistItemNotFound`] if no item has `item_id`.
pub fn rename_item(task: &mut Task, item_id: &str, text: &str) -> Result<(), TaskError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(TaskError::ChecklistTextEmpty);
    }
    item_mut(task, item_id)?.text = text.to_string();
    Ok(())
}
