use serde::{Deserialize, Serialize};

use crate::LisaError;

pub const DEFAULT_IMAGE_TOKEN: &str = "<image>";
pub const DEFAULT_IM_START_TOKEN: &str = "<im_start>";
pub const DEFAULT_IM_END_TOKEN: &str = "<im_end>";
pub const IMAGE_TOKEN_INDEX: i64 = -200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeparatorStyle {
    /// `system sep role: msg sep role: msg sep2 ...`
    Two,
    /// `[INST] <<SYS>> ... [/INST]` framing.
    Llama2,
}

/// Named conversation templates the exported checkpoints were tuned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvType {
    #[default]
    LlavaV1,
    LlavaLlama2,
}

impl std::str::FromStr for ConvType {
    type Err = LisaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llava_v1" => Ok(Self::LlavaV1),
            "llava_llama_2" => Ok(Self::LlavaLlama2),
            x => Err(LisaError::config(format!(
                "Unknown conversation template: {x}. Use llava_v1 or llava_llama_2"
            ))),
        }
    }
}

impl std::fmt::Display for ConvType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LlavaV1 => write!(f, "llava_v1"),
            Self::LlavaLlama2 => write!(f, "llava_llama_2"),
        }
    }
}

impl ConvType {
    pub fn template(&self) -> Conversation {
        match self {
            Self::LlavaV1 => Conversation {
                system: "A chat between a curious human and an artificial intelligence assistant. \
                         The assistant gives helpful, detailed, and polite answers to the human's questions.",
                roles: ["USER", "ASSISTANT"],
                messages: vec![],
                sep_style: SeparatorStyle::Two,
                sep: " ",
                sep2: "</s>",
            },
            Self::LlavaLlama2 => Conversation {
                system: "You are a helpful language and vision assistant. \
                         You are able to understand the visual content that the user provides, \
                         and assist the user with a variety of tasks using natural language.",
                roles: ["USER", "ASSISTANT"],
                messages: vec![],
                sep_style: SeparatorStyle::Llama2,
                sep: "<s>",
                sep2: "</s>",
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub system: &'static str,
    pub roles: [&'static str; 2],
    pub messages: Vec<(&'static str, String)>,
    pub sep_style: SeparatorStyle,
    pub sep: &'static str,
    pub sep2: &'static str,
}

impl Conversation {
    pub fn append_message(&mut self, role: &'static str, message: &str) {
        self.messages.push((role, message.to_string()));
    }

    pub fn get_prompt(&self) -> Result<String, LisaError> {
        match self.sep_style {
            SeparatorStyle::Two => {
                let seps = [self.sep, self.sep2];
                let mut ret = format!("{}{}", self.system, seps[0]);
                for (i, (role, message)) in self.messages.iter().enumerate() {
                    if message.is_empty() {
                        ret.push_str(&format!("{}:", role));
                    } else {
                        ret.push_str(&format!("{}: {}{}", role, message, seps[i % 2]));
                    }
                }
                Ok(ret)
            }
            SeparatorStyle::Llama2 => {
                let mut ret = String::new();
                for (i, (role, message)) in self.messages.iter().enumerate() {
                    if i == 0 && (message.is_empty() || *role != self.roles[0]) {
                        return Err(LisaError::config(
                            "llama_2 conversations must open with a non-empty user turn",
                        ));
                    }
                    if message.is_empty() {
                        continue;
                    }
                    if i % 2 == 0 {
                        let message = if i == 0 {
                            format!("<<SYS>>\n{}\n<</SYS>>\n\n{}", self.system, message)
                        } else {
                            message.to_string()
                        };
                        ret.push_str(&format!("{}[INST] {} [/INST]", self.sep, message));
                    } else {
                        ret.push_str(&format!(" {} {}", message, self.sep2));
                    }
                }
                let strip: &[char] = &self.sep.chars().collect::<Vec<_>>();
                Ok(ret.trim_start_matches(strip).to_string())
            }
        }
    }
}

/// Single-turn prompt construction for one instruction.
#[derive(Debug, Clone, Copy)]
pub struct ConversationBuilder {
    conv_type: ConvType,
    use_mm_start_end: bool,
}

impl ConversationBuilder {
    pub fn new(conv_type: ConvType, use_mm_start_end: bool) -> Self {
        Self {
            conv_type,
            use_mm_start_end,
        }
    }

    /// The user message: image marker, newline, then the instruction.
    pub fn user_message(&self, instruction: &str) -> String {
        let prompt = format!("{}\n{}", DEFAULT_IMAGE_TOKEN, instruction);
        if self.use_mm_start_end {
            let replace_token = format!(
                "{}{}{}",
                DEFAULT_IM_START_TOKEN, DEFAULT_IMAGE_TOKEN, DEFAULT_IM_END_TOKEN
            );
            prompt.replace(DEFAULT_IMAGE_TOKEN, &replace_token)
        } else {
            prompt
        }
    }

    pub fn build(&self, instruction: &str) -> Result<String, LisaError> {
        let mut conv = self.conv_type.template();
        let [user, assistant] = conv.roles;
        conv.append_message(user, &self.user_message(instruction));
        conv.append_message(assistant, "");
        conv.get_prompt()
    }
}
