//! Tagged-variant decode of the `{"action": ..., "value": ...}` wire
//! envelope, replacing the original's stringly-typed if/elif chain (see
//! `spec.md` §9's design note on this). Action names and their value
//! shapes are grounded on the dispatch chain in
//! `original_source/CuemsWsServer.py::CuemsWsUser.consumer`; `ProjectReady`/
//! `ProjectDeploy`/`HwDiscovery` have no original counterpart and are
//! spec-only additions for the Engine RPC Bridge.

use serde_json::Value;

use crate::errors::SessionError;

#[derive(Debug, Clone)]
pub enum Action {
    ProjectList,
    ProjectTrashList,
    ProjectLoad { uuid: String },
    ProjectSave { data: Value },
    ProjectDuplicate { uuid: String },
    ProjectDelete { uuid: String },
    ProjectRestore { uuid: String },
    ProjectTrashDelete { uuid: String },
    FileList,
    FileTrashList,
    FileSave { uuid: String, data: Value },
    FileLoadMeta { uuid: String },
    FileLoadThumbnail { uuid: String },
    FileLoadWaveform { uuid: String },
    FileDelete { uuid: String },
    FileRestore { uuid: String },
    FileTrashDelete { uuid: String },
    ProjectReady { uuid: String },
    ProjectDeploy { uuid: String },
    HwDiscovery,
}

impl Action {
    /// The tag this variant was decoded from / will be echoed back under,
    /// used to build error and reply frames.
    pub fn tag(&self) -> &'static str {
        match self {
            Action::ProjectList => "project_list",
            Action::ProjectTrashList => "project_trash_list",
            Action::ProjectLoad { .. } => "project_load",
            Action::ProjectSave { .. } => "project_save",
            Action::ProjectDuplicate { .. } => "project_duplicate",
            Action::ProjectDelete { .. } => "project_delete",
            Action::ProjectRestore { .. } => "project_restore",
            Action::ProjectTrashDelete { .. } => "project_trash_delete",
            Action::FileList => "file_list",
            Action::FileTrashList => "file_trash_list",
            Action::FileSave { .. } => "file_save",
            Action::FileLoadMeta { .. } => "file_load_meta",
            Action::FileLoadThumbnail { .. } => "file_load_thumbnail",
            Action::FileLoadWaveform { .. } => "file_load_waveform",
            Action::FileDelete { .. } => "file_delete",
            Action::FileRestore { .. } => "file_restore",
            Action::FileTrashDelete { .. } => "file_trash_delete",
            Action::ProjectReady { .. } => "project_ready",
            Action::ProjectDeploy { .. } => "project_deploy",
            Action::HwDiscovery => "hw_discovery",
        }
    }
}

fn value_string(envelope: &Value) -> Result<String, SessionError> {
    envelope
        .get("value")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| SessionError::Decode("expected a string \"value\" field".into()))
}

fn value_object(envelope: &Value) -> Result<Value, SessionError> {
    envelope
        .get("value")
        .cloned()
        .ok_or_else(|| SessionError::Decode("expected a \"value\" field".into()))
}

fn file_uuid_and_data(envelope: &Value) -> Result<(String, Value), SessionError> {
    let data = value_object(envelope)?;
    let uuid = data
        .get("uuid")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| SessionError::Decode("expected \"value.uuid\"".into()))?;
    Ok((uuid, data))
}

/// Decodes a parsed JSON envelope into an `Action`. Pure: no I/O, no
/// service calls — only the envelope shape is validated here.
pub fn decode(envelope: &Value) -> Result<Action, SessionError> {
    let action = envelope
        .get("action")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SessionError::Decode("missing \"action\" field".into()))?;

    Ok(match action {
        "project_list" => Action::ProjectList,
        "project_trash_list" => Action::ProjectTrashList,
        "project_load" => Action::ProjectLoad { uuid: value_string(envelope)? },
        "project_save" => Action::ProjectSave { data: value_object(envelope)? },
        "project_duplicate" => Action::ProjectDuplicate { uuid: value_string(envelope)? },
        "project_delete" => Action::ProjectDelete { uuid: value_string(envelope)? },
        "project_restore" => Action::ProjectRestore { uuid: value_string(envelope)? },
        "project_trash_delete" => Action::ProjectTrashDelete { uuid: value_string(envelope)? },
        "file_list" => Action::FileList,
        "file_trash_list" => Action::FileTrashList,
        "file_save" => {
            let (uuid, data) = file_uuid_and_data(envelope)?;
            Action::FileSave { uuid, data }
        }
        "file_load_meta" => Action::FileLoadMeta { uuid: value_string(envelope)? },
        "file_load_thumbnail" => Action::FileLoadThumbnail { uuid: value_string(envelope)? },
        "file_load_waveform" => Action::FileLoadWaveform { uuid: value_string(envelope)? },
        "file_delete" => Action::FileDelete { uuid: value_string(envelope)? },
        "file_restore" => Action::FileRestore { uuid: value_string(envelope)? },
        "file_trash_delete" => Action::FileTrashDelete { uuid: value_string(envelope)? },
        "project_ready" => Action::ProjectReady { uuid: value_string(envelope)? },
        "project_deploy" => Action::ProjectDeploy { uuid: value_string(envelope)? },
        "hw_discovery" => Action::HwDiscovery,
        other => return Err(SessionError::UnknownAction(other.to_string())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_project_load() {
        let envelope = json!({"action": "project_load", "value": "abc-123"});
        let action = decode(&envelope).unwrap();
        assert!(matches!(action, Action::ProjectLoad { uuid } if uuid == "abc-123"));
    }

    #[test]
    fn decodes_file_save_uuid_and_data() {
        let envelope = json!({"action": "file_save", "value": {"uuid": "m1", "name": "x"}});
        let action = decode(&envelope).unwrap();
        assert!(matches!(action, Action::FileSave { uuid, .. } if uuid == "m1"));
    }

    #[test]
    fn rejects_unknown_action() {
        let envelope = json!({"action": "self_destruct"});
        assert!(matches!(decode(&envelope), Err(SessionError::UnknownAction(_))));
    }

    #[test]
    fn rejects_missing_action_field() {
        let envelope = json!({"value": "x"});
        assert!(matches!(decode(&envelope), Err(SessionError::Decode(_))));
    }
}
