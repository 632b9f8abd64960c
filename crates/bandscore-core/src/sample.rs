//! A complete practice paper, used by `bandscore init`, tests and benches.

use crate::bands::{BandRange, BandTable};
use crate::model::{
    BandTables, ChoiceOption, ExamPaper, ListeningSection, Module, Question, ReadingPassage,
    SpeakingPart, WritingTask,
};

/// Conversion table for a module, with a catch-all lowest row.
pub fn standard_band_table(module: Module) -> BandTable {
    let rows: &[(u32, u32, f64)] = match module {
        Module::Listening => &[
            (39, 40, 9.0),
            (37, 38, 8.5),
            (35, 36, 8.0),
            (32, 34, 7.5),
            (30, 31, 7.0),
            (26, 29, 6.5),
            (23, 25, 6.0),
            (18, 22, 5.5),
            (16, 17, 5.0),
            (13, 15, 4.5),
            (10, 12, 4.0),
            (8, 9, 3.5),
            (6, 7, 3.0),
            (4, 5, 2.5),
            (0, 3, 2.0),
        ],
        _ => &[
            (39, 40, 9.0),
            (37, 38, 8.5),
            (35, 36, 8.0),
            (33, 34, 7.5),
            (30, 32, 7.0),
            (27, 29, 6.5),
            (23, 26, 6.0),
            (19, 22, 5.5),
            (15, 18, 5.0),
            (13, 14, 4.5),
            (10, 12, 4.0),
            (8, 9, 3.5),
            (6, 7, 3.0),
            (4, 5, 2.5),
            (0, 3, 2.0),
        ],
    };
    BandTable::new(
        rows.iter()
            .map(|&(min, max, band)| BandRange { min, max, band })
            .collect(),
    )
}

fn options(keys: &[(&str, &str)]) -> Vec<ChoiceOption> {
    keys.iter()
        .map(|(key, text)| ChoiceOption {
            key: key.to_string(),
            text: text.to_string(),
        })
        .collect()
}

fn gap(number: u32, prompt: &str, answer: &str) -> Question {
    Question::Text {
        number,
        prompt: prompt.to_string(),
        answer: answer.to_string(),
        max_words: Some(2),
    }
}

fn listening_section(index: u32) -> ListeningSection {
    let first = index * 10 + 1;
    let mut questions = Vec::new();
    match index {
        0 => {
            questions.push(gap(1, "Number of nights booked", "ten / 10"));
            questions.push(gap(2, "Contact number", "(020) 7946-0958"));
            for n in 3..=10 {
                questions.push(gap(n, &format!("Booking detail {n}"), &format!("detail {n}")));
            }
        }
        1 => {
            let map = options(&[
                ("A", "car park"),
                ("B", "café"),
                ("C", "gift shop"),
                ("D", "toilets"),
                ("E", "information desk"),
            ]);
            let keys = ["A", "B", "C", "D", "E"];
            for n in first..first + 10 {
                questions.push(Question::MapLabel {
                    number: n,
                    prompt: format!("Location {n}"),
                    options: map.clone(),
                    answer: keys[(n as usize) % keys.len()].to_string(),
                });
            }
        }
        2 => {
            let choices = options(&[("A", "agree"), ("B", "disagree"), ("C", "undecided")]);
            for n in first..first + 10 {
                questions.push(Question::MultipleChoice {
                    number: n,
                    prompt: format!("What does the tutor think about point {n}?"),
                    options: choices.clone(),
                    answer: ["A", "B", "C"][(n as usize) % 3].to_string(),
                });
            }
        }
        _ => {
            for n in first..first + 10 {
                questions.push(gap(n, &format!("Lecture note {n}"), &format!("term {n}")));
            }
        }
    }
    ListeningSection {
        title: format!("Part {}", index + 1),
        audio: vec![
            format!("audio/part{}.mp3", index + 1),
            format!("audio/part{}.ogg", index + 1),
        ],
        transcript: format!("Transcript of listening part {}.", index + 1),
        questions,
    }
}

fn reading_passages() -> Vec<ReadingPassage> {
    let headings = options(&[
        ("i", "Early designs"),
        ("ii", "Public reaction"),
        ("iii", "Later improvements"),
        ("iv", "Funding problems"),
    ]);
    let first: Vec<Question> = (1..=13)
        .map(|n| gap(n, &format!("Complete the summary, gap {n}"), &format!("word {n}")))
        .collect();
    let second: Vec<Question> = (14..=26)
        .map(|n| Question::Matching {
            number: n,
            prompt: format!("Choose the heading for paragraph {n}"),
            options: headings.clone(),
            answer: ["i", "ii", "iii", "iv"][(n as usize) % 4].to_string(),
        })
        .collect();
    let third: Vec<Question> = (27..=40)
        .map(|n| Question::Tfng {
            number: n,
            prompt: format!("Statement {n} about the passage."),
            answer: ["TRUE", "FALSE", "NOT GIVEN"][(n as usize) % 3].to_string(),
        })
        .collect();

    vec![
        ReadingPassage {
            title: "The History of Glass".into(),
            text: "Glass has been made for over four thousand years...".into(),
            questions: first,
        },
        ReadingPassage {
            title: "Urban Beekeeping".into(),
            text: "Paragraph A. Bees were first kept on rooftops...".into(),
            questions: second,
        },
        ReadingPassage {
            title: "Sleep and Memory".into(),
            text: "Researchers have long suspected that sleep...".into(),
            questions: third,
        },
    ]
}

/// A full, valid practice paper.
pub fn sample_paper() -> ExamPaper {
    ExamPaper {
        id: "practice-1".into(),
        title: "Practice Test 1".into(),
        description: "Academic practice paper".into(),
        listening: (0..4).map(listening_section).collect(),
        reading: reading_passages(),
        writing: vec![
            WritingTask {
                number: 1,
                prompt: "The chart shows household energy use in three countries. Summarise the information.".into(),
                min_words: 150,
                model_answer: Some("The bar chart compares...".into()),
            },
            WritingTask {
                number: 2,
                prompt: "Some people think cities should ban private cars. To what extent do you agree?".into(),
                min_words: 250,
                model_answer: Some("It is often argued that...".into()),
            },
        ],
        speaking: vec![
            SpeakingPart {
                number: 1,
                prompt: "Introduction and interview".into(),
                questions: vec!["Where do you live?".into(), "Do you work or study?".into()],
                prep_secs: 0,
            },
            SpeakingPart {
                number: 2,
                prompt: "Describe a place you visited that you would like to return to.".into(),
                questions: vec![],
                prep_secs: 60,
            },
            SpeakingPart {
                number: 3,
                prompt: "Discussion: tourism and travel".into(),
                questions: vec!["How has tourism changed in your country?".into()],
                prep_secs: 0,
            },
        ],
        band_tables: BandTables {
            listening: standard_band_table(Module::Listening),
            reading: standard_band_table(Module::Reading),
        },
    }
}
