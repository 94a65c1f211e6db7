//! `stepforge tools`: list built-in tools.

use stepforge_core::tool::ToolRegistry;

pub fn run() {
    print!("{}", render(&stepforge_tools::default_registry()));
    println!();
    println!("   `search` and `math_llm` are available when a responder is configured.");
}

fn render(registry: &ToolRegistry) -> String {
    let descriptors = registry.descriptors();
    let width = descriptors.iter().map(|d| d.name.len()).max().unwrap_or(0);

    let mut out = format!("🔧 {} built-in tool(s)\n\n", descriptors.len());
    for d in &descriptors {
        out.push_str(&format!("   {:<width$}  {}\n", d.name, d.description));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_default_tool() {
        let out = render(&stepforge_tools::default_registry());
        for name in ["abs_difference", "calculator", "echo", "math_code", "web_search"] {
            assert!(out.contains(name), "missing {name}");
        }
        assert!(out.starts_with("🔧 5 built-in tool(s)"));
    }
}
