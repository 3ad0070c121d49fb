//! Owner-reference helpers.
//!
//! Every function here preserves the invariant that an object carries at most
//! one owner reference with the controller flag set.

use crate::error::Error;
use crate::gvk::GroupVersionKind;
use crate::key::encode_key;
use crate::meta::{ObjectMeta, OwnerReference};
use crate::resource::Resource;
use crate::result::Result;

/// Build an owner reference pointing at `owner`.
///
/// # Errors
///
/// Returns [`Error::MissingOwnerUid`] if the owner has not been persisted yet.
pub fn owner_reference_for<O: Resource>(owner: &O) -> Result<OwnerReference> {
    let meta = owner.meta();
    if meta.uid.is_empty() {
        return Err(Error::missing_owner_uid(meta.key()));
    }

    let gvk = O::gvk();
    Ok(OwnerReference {
        api_version: gvk.api_version(),
        kind: gvk.kind,
        name: meta.name.clone(),
        uid: meta.uid.clone(),
        controller: None,
        block_owner_deletion: None,
    })
}

/// Add or update an owner reference to `owner` on `owned`.
///
/// An existing reference with the same uid is replaced. With `controller`
/// set, the reference is marked as the managing controller and
/// `block_owner_deletion` is set.
///
/// # Errors
///
/// Returns [`Error::AlreadyControlled`] when `controller` is requested but a
/// different owner already holds the controller reference, and
/// [`Error::MissingOwnerUid`] when the owner has no uid.
pub fn set_owner_reference<O: Resource>(
    owned: &mut ObjectMeta,
    owner: &O,
    controller: bool,
) -> Result<()> {
    let mut reference = owner_reference_for(owner)?;
    if controller {
        reference.controller = Some(true);
        reference.block_owner_deletion = Some(true);

        let conflicting = get_controller_reference(owned).filter(|r| r.uid != reference.uid);
        if let Some(existing) = conflicting {
            return Err(Error::already_controlled(
                owned.key(),
                existing.kind.clone(),
                existing.name.clone(),
            ));
        }
    }

    match owned
        .owner_references
        .iter_mut()
        .find(|r| r.uid == reference.uid)
    {
        Some(existing) => *existing = reference,
        None => owned.owner_references.push(reference),
    }
    Ok(())
}

/// Remove every owner reference with the given uid. Returns whether any
/// reference was removed.
pub fn remove_owner_reference(owned: &mut ObjectMeta, owner_uid: &str) -> bool {
    let before = owned.owner_references.len();
    owned.owner_references.retain(|r| r.uid != owner_uid);
    owned.owner_references.len() != before
}

/// Whether `owned` carries an owner reference with the given uid.
pub fn is_owned_by(owned: &ObjectMeta, owner_uid: &str) -> bool {
    owned.owner_references.iter().any(|r| r.uid == owner_uid)
}

/// The controller owner reference, if one exists.
pub fn get_controller_reference(owned: &ObjectMeta) -> Option<&OwnerReference> {
    owned.owner_references.iter().find(|r| r.is_controller())
}

/// Keys of the owners of `owned` that are of type `owner_kind`.
///
/// Owners live in the subordinate's namespace, so a cluster-scoped subordinate
/// yields bare owner names. With `controller_only`, only the reference with the
/// controller flag qualifies.
pub fn owner_keys(
    owned: &ObjectMeta,
    owner_kind: &GroupVersionKind,
    controller_only: bool,
) -> Vec<String> {
    owned
        .owner_references
        .iter()
        .filter(|r| owner_kind.matches(&r.api_version, &r.kind))
        .filter(|r| !controller_only || r.is_controller())
        .map(|r| encode_key(&owned.namespace, &r.name))
        .collect()
}
