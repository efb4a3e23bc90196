//! Standard permissions and roles for the events platform.

use crate::catalog::{Catalog, Role};
use crate::error::Result;
use crate::permission::{Permission, PermissionKey};
use crate::types::RoleName;

/// Authority to grant and revoke roles within a scope.
pub const MANAGE_ROLES: &str = "MANAGE_ROLES";
/// Invite, remove and edit members of an entity.
pub const MANAGE_MEMBERS: &str = "MANAGE_MEMBERS";
/// Assign staff and performers to event roles.
pub const ASSIGN_EVENT_ROLES: &str = "ASSIGN_EVENT_ROLES";
/// Edit schedules, load-in and other event logistics.
pub const EDIT_EVENT_LOGISTICS: &str = "EDIT_EVENT_LOGISTICS";
/// Edit public event details.
pub const EDIT_EVENT_DETAILS: &str = "EDIT_EVENT_DETAILS";
/// View the staffing roster of an event.
pub const VIEW_EVENT_STAFF: &str = "VIEW_EVENT_STAFF";
/// Edit site maps.
pub const MANAGE_SITE_MAP: &str = "MANAGE_SITE_MAP";
/// Manage bookings and offers.
pub const MANAGE_BOOKINGS: &str = "MANAGE_BOOKINGS";
/// Edit a venue profile.
pub const EDIT_VENUE_PROFILE: &str = "EDIT_VENUE_PROFILE";
/// Delete one specific venue.
pub const DELETE_VENUE: &str = "DELETE_VENUE";
/// Delete one specific event.
pub const DELETE_EVENT: &str = "DELETE_EVENT";

/// Name of the platform super-admin role.
pub const SUPER_ADMIN: &str = "SuperAdmin";

fn key(value: &'static str) -> PermissionKey {
    PermissionKey::from_static(value)
}

fn role_name(value: &str) -> Result<RoleName> {
    RoleName::new(value)
}

/// Permission catalog of the platform.
pub fn platform_permissions() -> Vec<Permission> {
    vec![
        Permission::inheritable(key(MANAGE_ROLES)).with_description("grant and revoke roles"),
        Permission::inheritable(key(MANAGE_MEMBERS)).with_description("manage members"),
        Permission::inheritable(key(ASSIGN_EVENT_ROLES)).with_description("assign event roles"),
        Permission::inheritable(key(EDIT_EVENT_LOGISTICS)).with_description("edit logistics"),
        Permission::inheritable(key(EDIT_EVENT_DETAILS)).with_description("edit event details"),
        Permission::inheritable(key(VIEW_EVENT_STAFF)).with_description("view event staff"),
        Permission::inheritable(key(MANAGE_SITE_MAP)).with_description("edit site maps"),
        Permission::inheritable(key(MANAGE_BOOKINGS)).with_description("manage bookings"),
        Permission::local(key(EDIT_VENUE_PROFILE)).with_description("edit this venue"),
        Permission::local(key(DELETE_VENUE)).with_description("delete this venue"),
        Permission::local(key(DELETE_EVENT)).with_description("delete this event"),
    ]
}

/// Standard roles of the platform.
pub fn platform_roles() -> Result<Vec<Role>> {
    Ok(vec![
        Role::global(role_name(SUPER_ADMIN)?).system(),
        Role::global(role_name("Moderator")?).with_permissions([
            key(MANAGE_MEMBERS),
            key(VIEW_EVENT_STAFF),
        ]),
        Role::entity(role_name("OrganizationOwner")?).with_permissions([
            key(MANAGE_ROLES),
            key(MANAGE_MEMBERS),
            key(ASSIGN_EVENT_ROLES),
            key(EDIT_EVENT_LOGISTICS),
            key(EDIT_EVENT_DETAILS),
            key(VIEW_EVENT_STAFF),
            key(MANAGE_SITE_MAP),
            key(MANAGE_BOOKINGS),
        ]),
        Role::entity(role_name("VenueOwner")?).with_permissions([
            key(MANAGE_ROLES),
            key(MANAGE_MEMBERS),
            key(EDIT_VENUE_PROFILE),
            key(DELETE_VENUE),
            key(EDIT_EVENT_LOGISTICS),
            key(MANAGE_BOOKINGS),
        ]),
        Role::entity(role_name("VenueManager")?).with_permissions([
            key(EDIT_EVENT_LOGISTICS),
            key(ASSIGN_EVENT_ROLES),
            key(MANAGE_SITE_MAP),
            key(VIEW_EVENT_STAFF),
        ]),
        Role::entity(role_name("EventManager")?).with_permissions([
            key(MANAGE_ROLES),
            key(ASSIGN_EVENT_ROLES),
            key(EDIT_EVENT_LOGISTICS),
            key(EDIT_EVENT_DETAILS),
            key(VIEW_EVENT_STAFF),
            key(MANAGE_SITE_MAP),
            key(DELETE_EVENT),
        ]),
        Role::entity(role_name("EventStaff")?).with_permissions([key(VIEW_EVENT_STAFF)]),
        Role::entity(role_name("AgencyManager")?).with_permissions([
            key(MANAGE_MEMBERS),
            key(MANAGE_BOOKINGS),
        ]),
    ])
}

/// Builds a catalog holding the platform's standard permissions and roles.
pub fn platform_catalog() -> Result<Catalog> {
    let builder = platform_permissions()
        .into_iter()
        .fold(Catalog::builder(), |builder, permission| {
            builder.permission(permission)
        });
    platform_roles()?
        .into_iter()
        .fold(builder, |builder, role| builder.role(role))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_catalog_builds() {
        let catalog = platform_catalog().unwrap();
        assert!(catalog.get_role(SUPER_ADMIN).unwrap().is_override());
        assert!(catalog.is_inheritable(EDIT_EVENT_LOGISTICS));
        assert!(!catalog.is_inheritable(DELETE_VENUE));
        assert!(
            !catalog
                .get_role("VenueManager")
                .unwrap()
                .permissions
                .contains(DELETE_VENUE)
        );
    }
}
