use crate::error::Result;
use crate::settings::load_settings;

pub fn run(text: &str) -> Result<()> {
    let classifier = load_settings().classifier()?;
    match classifier.find(text) {
        Some(code) => println!("{code}"),
        None => println!("{} (no keyword matched)", classifier.fallback()),
    }
    Ok(())
}
