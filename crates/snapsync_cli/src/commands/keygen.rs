//! Keygen command implementation.

use snapsync_protocol::{ExportedKeys, GroupKey, WriterIdentity};

/// Generates a fresh key pair set.
pub fn generate() -> ExportedKeys {
    ExportedKeys::new(&WriterIdentity::generate(), &GroupKey::generate())
}

/// Runs the keygen command.
pub fn run(format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let keys = generate();
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&keys)?);
        }
        _ => {
            let (writer, group) = keys.parse()?;
            println!("Writer key:   {}", keys.writer);
            println!("Writer id:    {}", writer.id());
            println!("Group key:    {}", keys.group);
            println!("Group topic:  {}", group.topic());
            println!();
            println!("Share the group key with every device of the replica group.");
            println!("Keep the writer key private to this device.");
        }
    }
    Ok(())
}
