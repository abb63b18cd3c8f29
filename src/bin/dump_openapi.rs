use std::fs;

fn main() -> anyhow::Result<()> {
    let doc = warden::docs::build_openapi();
    let json = serde_json::to_string_pretty(&doc)?;

    match std::env::args().nth(1) {
        Some(path) => {
            fs::write(&path, json)?;
            println!("wrote {}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}
