// LLMモジュール - 外部APIのスキーマとプロンプトをまとめたモジュール

pub mod prompts;
pub mod schemas;
