use anyhow::Result;
use comfy_table::Cell;
use matchpack_core::Curator;

use super::output::{print_json, table};

pub fn show(curator: &Curator, json: bool) -> Result<()> {
    let settings = curator.settings()?;
    if json {
        return print_json(&settings);
    }
    let mut t = table(&["Key", "Value"]);
    for (key, value) in settings.entries() {
        t.add_row(vec![Cell::new(key), Cell::new(value)]);
    }
    println!("{t}");
    Ok(())
}

pub fn set(curator: &Curator, key: &str, value: &str) -> Result<()> {
    let settings = curator.set_setting(key, value)?;
    let shown = settings
        .entries()
        .into_iter()
        .find(|(k, _)| *k == key)
        .map_or_else(|| value.to_string(), |(_, v)| v);
    println!("{key} = {shown}");
    Ok(())
}
