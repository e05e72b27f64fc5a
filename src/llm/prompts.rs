// プロンプトテンプレートを管理するモジュール
use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

// テンプレート変数のタイプ
pub type TemplateVariables = Vec<(String, String)>;

pub const CODE_REVIEW_SYSTEM: &str = "code_review_system";
pub const CODE_REVIEW_USER: &str = "code_review_user";

// テンプレートをファイルから読み込む
pub fn load_template(template_dir: &Path, template_name: &str) -> Result<String> {
    let template_path = template_dir.join(format!("{}.txt", template_name));

    if !template_path.exists() {
        return Err(anyhow!(
            "テンプレートファイル {} が見つかりません",
            template_path.display()
        ));
    }

    fs::read_to_string(&template_path).map_err(|e| {
        anyhow!(
            "テンプレートファイル {} の読み込みに失敗: {}",
            template_path.display(),
            e
        )
    })
}

/// ディレクトリ上のテンプレートを優先し、無ければ組み込みのものを使う
pub fn get_template(template_dir: Option<&Path>, template_name: &str) -> Result<String> {
    if let Some(dir) = template_dir {
        if let Ok(content) = load_template(dir, template_name) {
            return Ok(content);
        }
    }
    get_default_templates()
        .remove(template_name)
        .ok_or_else(|| anyhow!("テンプレート {} は存在しません", template_name))
}

// テンプレート内の変数を置換
pub fn render_template(template: &str, variables: &TemplateVariables) -> String {
    let mut rendered = template.to_string();

    for (key, value) in variables {
        let placeholder = format!("{{{{{}}}}}", key);
        rendered = rendered.replace(&placeholder, value);
    }

    rendered
}

// デフォルトテンプレートのマップを取得
pub fn get_default_templates() -> HashMap<String, String> {
    let mut templates = HashMap::new();

    templates.insert(
        CODE_REVIEW_SYSTEM.to_string(),
        r#"You are a senior engineer reviewing a single file from the repository "{{repo}}".
Reply with a JSON array only. Each element must be an object
{"line": <1-based line number or null>, "message": "<one concrete suggestion>"}.
Return at most {{max_suggestions}} suggestions, most important first.
Return [] if there is nothing worth changing."#
            .to_string(),
    );

    templates.insert(
        CODE_REVIEW_USER.to_string(),
        r#"File: {{path}}

```
{{content}}
```"#
            .to_string(),
    );

    templates
}
