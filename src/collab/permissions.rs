use crate::models::{PermissionRole, Principal, StoredDocument};

/// True iff the principal may open a session on the document: the owner,
/// or anyone present in the permission list.
pub fn can_join(principal: &Principal, doc: &StoredDocument) -> bool {
    doc.owner == principal.user_id
        || doc
            .permissions
            .iter()
            .any(|p| p.user_id == principal.user_id)
}

/// True iff the principal may apply changes: the owner, or a permission
/// entry with any role other than viewer.
pub fn can_edit(principal: &Principal, doc: &StoredDocument) -> bool {
    doc.owner == principal.user_id
        || doc
            .permissions
            .iter()
            .any(|p| p.user_id == principal.user_id && p.role != PermissionRole::Viewer)
}
