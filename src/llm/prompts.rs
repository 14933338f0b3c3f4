use crate::classifier::OracleRequest;
use crate::taxonomy::Section;

pub const SYSTEM_PROMPT_CLASSIFY: &str = r#"
You are an expert IFRS accountant mapping trial-balance accounts onto a statement of financial position.

## RULES
- Choose exactly one line from the structure below.
- Keep the account on the same side it was booked on: an asset stays under "Assets", a liability or equity account stays under "Equity and Liabilities".
- Account names may be English, Russian or Uzbek. Translate mentally before deciding.
- Use "Other" (or "Other Reserves" for equity) when nothing fits. Never invent a line.

## OUTPUT FORMAT
Return only JSON with the fields `category`, `subcategory_1` and `subcategory_2`, using the labels exactly as written in the structure.
"#;

/// Renders the available structure, one section per line.
pub fn structure_outline() -> String {
    let mut outline = String::new();
    for root in ["Assets", "Equity and Liabilities"] {
        outline.push_str(&format!("- {}\n", root));
        for section in Section::ALL {
            let in_root = match section.root_key() {
                "assets" => root == "Assets",
                _ => root != "Assets",
            };
            if !in_root {
                continue;
            }
            let leaves: Vec<&str> = section.leaves().iter().map(|l| l.label()).collect();
            outline.push_str(&format!("    - {} ({})\n", section.label(), leaves.join(", ")));
        }
    }
    outline
}

pub fn classification_prompt(request: &OracleRequest) -> String {
    format!(
        "Map the following financial account to the most appropriate IFRS line.\n\n\
         Account Name: \"{}\"\n\
         Account Code: \"{}\"\n\
         Original Category: \"{}\"\n\
         Amount: {}\n\n\
         Available IFRS Structure:\n{}",
        request.name,
        request.code,
        request.category,
        request.amount,
        structure_outline()
    )
}
