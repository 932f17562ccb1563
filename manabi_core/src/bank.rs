//! Question-bank loading from CSV or Excel files

use std::collections::HashSet;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use csv::{ReaderBuilder, WriterBuilder};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::questions::{letter_to_index, Question, QuestionBank, CHOICE_LETTERS};

/// Header written by [`write_csv`].
pub const BANK_HEADER: [&str; 8] = [
    "topic",
    "question",
    "option_a",
    "option_b",
    "option_c",
    "option_d",
    "correct_answer",
    "difficulty",
];

/// Load a question bank, picking the parser from the file extension.
pub fn load_bank(path: impl AsRef<Path>) -> Result<QuestionBank> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::MissingData(path.to_path_buf()));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let rows = match extension.as_str() {
        "xlsx" | "xls" | "xlsm" | "ods" => read_excel_rows(path)?,
        "csv" | "" => read_csv_rows(path)?,
        _ => {
            return Err(Error::Validation(format!(
                "unsupported question bank format: .{extension}"
            )))
        }
    };

    let questions = parse_rows(rows)?;
    if questions.is_empty() {
        return Err(Error::EmptyData(path.to_path_buf()));
    }

    info!(path = %path.display(), count = questions.len(), "question bank loaded");
    Ok(QuestionBank::new(questions))
}

/// Column index mapping
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColumnMapping {
    topic: usize,
    question: usize,
    options: [usize; 4],
    answer: usize,
    difficulty: usize,
}

/// Detect column indices from header names
fn detect_columns(headers: &[String]) -> Result<ColumnMapping> {
    let mut topic = None;
    let mut question = None;
    let mut options: [Option<usize>; 4] = [None; 4];
    let mut answer = None;
    let mut difficulty = None;

    for (i, header) in headers.iter().enumerate() {
        match header.trim().to_lowercase().as_str() {
            "topic" | "realm" | "category" => topic = Some(i),
            "question" | "prompt" | "question_text" => question = Some(i),
            "option_a" | "a" => options[0] = Some(i),
            "option_b" | "b" => options[1] = Some(i),
            "option_c" | "c" => options[2] = Some(i),
            "option_d" | "d" => options[3] = Some(i),
            "correct_answer" | "answer" | "correct" => answer = Some(i),
            "difficulty" | "level" | "difficulty_level" => difficulty = Some(i),
            _ => {}
        }
    }

    let missing = |name: &str| Error::Validation(format!("missing required '{name}' column in header"));
    Ok(ColumnMapping {
        topic: topic.ok_or_else(|| missing("topic"))?,
        question: question.ok_or_else(|| missing("question"))?,
        options: [
            options[0].ok_or_else(|| missing("option_a"))?,
            options[1].ok_or_else(|| missing("option_b"))?,
            options[2].ok_or_else(|| missing("option_c"))?,
            options[3].ok_or_else(|| missing("option_d"))?,
        ],
        answer: answer.ok_or_else(|| missing("correct_answer"))?,
        difficulty: difficulty.ok_or_else(|| missing("difficulty"))?,
    })
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(|s| s.trim()).unwrap_or("")
}

fn row_to_question(mapping: &ColumnMapping, row: &[String]) -> Result<Question> {
    let topic = cell(row, mapping.topic).parse()?;
    let difficulty = cell(row, mapping.difficulty).parse()?;
    let answer = cell(row, mapping.answer);
    let correct_index = letter_to_index(answer).ok_or_else(|| {
        Error::Validation(format!(
            "answer '{answer}' is not one of {}",
            CHOICE_LETTERS.iter().collect::<String>()
        ))
    })?;
    let options = mapping.options.map(|i| cell(row, i).to_string());
    Question::new(topic, cell(row, mapping.question), options, correct_index, difficulty)
}

/// Turn raw rows (header first) into questions, skipping damaged rows.
fn parse_rows(rows: Vec<Vec<String>>) -> Result<Vec<Question>> {
    let mut rows = rows.into_iter();
    let header = rows
        .next()
        .ok_or_else(|| Error::Validation("empty file - no header row".to_string()))?;
    let mapping = detect_columns(&header)?;

    let mut seen = HashSet::new();
    let mut questions = Vec::new();

    for (offset, row) in rows.enumerate() {
        // header is line 1
        let line = offset + 2;
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        if row.iter().map(|c| c.trim().to_lowercase()).eq(header.iter().map(|h| h.trim().to_lowercase())) {
            warn!(line, "skipping repeated header row");
            continue;
        }
        match row_to_question(&mapping, &row) {
            Ok(q) => {
                if seen.insert(q.prompt.clone()) {
                    questions.push(q);
                } else {
                    warn!(line, prompt = %q.prompt, "skipping duplicate question");
                }
            }
            Err(e) => warn!(line, error = %e, "skipping damaged question row"),
        }
    }

    Ok(questions)
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => rows.push(record.iter().map(|s| s.to_string()).collect()),
            Err(e) => warn!(error = %e, "skipping unreadable CSV row"),
        }
    }
    Ok(rows)
}

fn read_excel_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| Error::EmptyData(path.to_path_buf()))?;
    let range = workbook.worksheet_range(&sheet_name)?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(get_cell_string).collect())
        .collect())
}

/// Helper to extract string from Excel cell
fn get_cell_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

/// Write questions as a normalised CSV bank.
pub fn write_csv(path: impl AsRef<Path>, questions: &[Question]) -> Result<()> {
    let mut writer = WriterBuilder::new().from_path(path.as_ref())?;
    writer.write_record(BANK_HEADER)?;
    for q in questions {
        let letter = q.correct_letter().to_string();
        writer.write_record([
            q.topic.as_str(),
            q.prompt.as_str(),
            q.options[0].as_str(),
            q.options[1].as_str(),
            q.options[2].as_str(),
            q.options[3].as_str(),
            letter.as_str(),
            q.difficulty.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realm::{Difficulty, Topic};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_and_normalises_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "bank.csv",
            "topic,question,option_a,option_b,option_c,option_d,correct_answer,difficulty\n\
             Grammar ,What is the past tense of 'run'?,runned,ran,run,running, b ,EASY\n\
             articles,___ sun rises in the east,A,An,The,No article,C,easy\n",
        );
        let bank = load_bank(&path).unwrap();
        assert_eq!(bank.len(), 2);
        let q = &bank.all()[0];
        assert_eq!(q.topic, Topic::Grammar);
        assert_eq!(q.difficulty, Difficulty::Easy);
        assert_eq!(q.correct_answer(), "ran");
    }

    #[test]
    fn skips_damaged_duplicate_and_repeated_header_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "bank.csv",
            "topic,question,option_a,option_b,option_c,option_d,correct_answer,difficulty\n\
             antonyms,Choose the opposite of 'happy':,glad,sad,excited,cheerful,B,early\n\
             antonyms,What is the opposite of 'hot'?,warm,cold,cool,mild,B,easy\n\
             antonyms,What is the opposite of 'hot'?,warm,cold,cool,mild,B,easy\n\
             topic,question,option_a,option_b,option_c,option_d,correct_answer,difficulty\n\
             spelling,Spell cat,cat,kat,catt,ct,A,easy\n\
             grammar,Too short,a,b\n\
             synonyms,Synonym for 'quick'?,slow,fast,heavy,careful,E,easy\n\
             \n",
        );
        let bank = load_bank(&path).unwrap();
        assert_eq!(bank.len(), 1);
        assert_eq!(bank.all()[0].prompt, "What is the opposite of 'hot'?");
    }

    #[test]
    fn header_aliases_are_accepted() {
        let headers: Vec<String> = ["Realm", "Prompt", "A", "B", "C", "D", "Answer", "Level", "notes"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mapping = detect_columns(&headers).unwrap();
        assert_eq!(mapping.topic, 0);
        assert_eq!(mapping.options, [2, 3, 4, 5]);
        assert_eq!(mapping.difficulty, 7);
    }

    #[test]
    fn missing_column_is_reported() {
        let headers: Vec<String> = ["topic", "question", "option_a"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let err = detect_columns(&headers).unwrap_err();
        assert!(err.to_string().contains("option_b"));
    }

    #[test]
    fn missing_and_empty_files_are_distinct() {
        let dir = TempDir::new().unwrap();
        let err = load_bank(dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, Error::MissingData(_)));
        assert!(err.is_data_unavailable());

        let path = write_file(
            &dir,
            "empty.csv",
            "topic,question,option_a,option_b,option_c,option_d,correct_answer,difficulty\n",
        );
        let err = load_bank(&path).unwrap_err();
        assert!(matches!(err, Error::EmptyData(_)));
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "bank.txt", "whatever");
        assert!(matches!(load_bank(&path), Err(Error::Validation(_))));
    }

    #[test]
    fn written_bank_loads_back() {
        let dir = TempDir::new().unwrap();
        let q = Question::new(
            Topic::Sentences,
            "Which sentence is right?",
            [
                "I can sings well".into(),
                "I can sing well".into(),
                "I can sang well".into(),
                "I can singing well".into(),
            ],
            1,
            Difficulty::Easy,
        )
        .unwrap();
        let path = dir.path().join("out.csv");
        write_csv(&path, std::slice::from_ref(&q)).unwrap();
        let bank = load_bank(&path).unwrap();
        assert_eq!(bank.all(), &[q]);
    }
}
