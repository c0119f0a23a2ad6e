//! Permission checks for bot commands

/// Privilege level of whoever issued a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Privilege {
    /// Any member of the community
    Member = 1,
    /// Holds the platform's Manage Server permission
    ManageCommunity = 2,
}

impl Privilege {
    pub fn from_manage_flag(can_manage: bool) -> Self {
        if can_manage {
            Privilege::ManageCommunity
        } else {
            Privilege::Member
        }
    }
}

/// Actions exposed through bot commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    CreateInvite,
    ListMappings,
    ClearMappings,
}

/// Permission matrix for bot commands
pub struct PermissionMatrix;

impl PermissionMatrix {
    /// Check if a privilege level may perform an action
    pub fn can_perform(privilege: Privilege, action: CommandAction) -> bool {
        match action {
            // Anyone can look
            CommandAction::ListMappings => privilege >= Privilege::Member,

            // Changing mappings needs Manage Server
            CommandAction::CreateInvite => privilege >= Privilege::ManageCommunity,
            CommandAction::ClearMappings => privilege >= Privilege::ManageCommunity,
        }
    }
}
