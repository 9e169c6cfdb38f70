pub mod openai_chat_completions2gemini;
