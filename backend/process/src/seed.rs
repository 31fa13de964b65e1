//! Starter content: the core ORT subjects, each with a short free test.

pub struct SubjectTemplate {
    pub name: &'static str,
    pub name_kg: &'static str,
    pub description: &'static str,
    pub test: TestTemplate,
}

pub struct TestTemplate {
    pub title: &'static str,
    pub description: &'static str,
    pub questions: &'static [QuestionTemplate],
}

pub struct QuestionTemplate {
    pub text: &'static str,
    pub options: &'static [&'static str],
    pub correct_answer: i32,
    pub explanation: &'static str,
}

/// Minutes.
pub const FREE_TEST_TIME_LIMIT: i32 = 15;

pub const SUBJECTS: &[SubjectTemplate] = &[
    SubjectTemplate {
        name: "Математика",
        name_kg: "Математика",
        description: "Тесты по математике",
        test: TestTemplate {
            title: "Вводный тест по математике",
            description: "Базовые вопросы по алгебре и геометрии для подготовки к ОРТ",
            questions: &[
                QuestionTemplate {
                    text: "Чему равно 2 + 2?",
                    options: &["3", "4", "5", "6"],
                    correct_answer: 1,
                    explanation: "Сложение: 2 + 2 = 4",
                },
                QuestionTemplate {
                    text: "Чему равно 5 × 3?",
                    options: &["10", "15", "20", "25"],
                    correct_answer: 1,
                    explanation: "Умножение: 5 × 3 = 15",
                },
                QuestionTemplate {
                    text: "Что такое площадь квадрата со стороной 5?",
                    options: &["10", "20", "25", "30"],
                    correct_answer: 2,
                    explanation: "Площадь квадрата = сторона² = 5² = 25",
                },
            ],
        },
    },
    SubjectTemplate {
        name: "Русский язык",
        name_kg: "Орус тили",
        description: "Тесты по русскому языку",
        test: TestTemplate {
            title: "Вводный тест по русскому языку",
            description: "Проверка знаний по орфографии и пунктуации",
            questions: &[
                QuestionTemplate {
                    text: "Выберите правильный вариант: \"Я (что) делаю?\"",
                    options: &["что", "что-то", "ничего", "чтото"],
                    correct_answer: 1,
                    explanation: "Правильно писать через дефис: что-то",
                },
                QuestionTemplate {
                    text: "Где нужно поставить запятую? \"Он пришел(,) когда все уже ушли\"",
                    options: &[
                        "Запятая не нужна",
                        "После \"пришел\"",
                        "После \"когда\"",
                        "После \"уже\"",
                    ],
                    correct_answer: 1,
                    explanation: "В сложноподчиненном предложении нужна запятая перед союзом \"когда\"",
                },
            ],
        },
    },
    SubjectTemplate {
        name: "Английский язык",
        name_kg: "Англис тили",
        description: "Тесты по английскому языку",
        test: TestTemplate {
            title: "Вводный тест по английскому языку",
            description: "Базовые вопросы по грамматике и лексике",
            questions: &[
                QuestionTemplate {
                    text: "Choose the correct form: \"I ___ to school every day\"",
                    options: &["go", "goes", "went", "going"],
                    correct_answer: 0,
                    explanation: "Present Simple: I go, he/she goes",
                },
                QuestionTemplate {
                    text: "What is the past tense of \"go\"?",
                    options: &["goed", "went", "goes", "gone"],
                    correct_answer: 1,
                    explanation: "Неправильный глагол: go - went - gone",
                },
            ],
        },
    },
    SubjectTemplate {
        name: "История",
        name_kg: "Тарых",
        description: "Тесты по истории",
        test: TestTemplate {
            title: "Вводный тест по истории",
            description: "Основные вопросы по истории Кыргызстана и мира",
            questions: &[QuestionTemplate {
                text: "В каком году Кыргызстан получил независимость?",
                options: &["1990", "1991", "1992", "1993"],
                correct_answer: 1,
                explanation: "Кыргызстан получил независимость 31 августа 1991 года",
            }],
        },
    },
    SubjectTemplate {
        name: "Естествознание",
        name_kg: "Табигый билим",
        description: "Тесты по естествознанию",
        test: TestTemplate {
            title: "Вводный тест по естествознанию",
            description: "Базовые вопросы по физике, химии и биологии",
            questions: &[
                QuestionTemplate {
                    text: "Сколько планет в Солнечной системе?",
                    options: &["7", "8", "9", "10"],
                    correct_answer: 1,
                    explanation: "В Солнечной системе 8 планет",
                },
                QuestionTemplate {
                    text: "Какая формула воды?",
                    options: &["H2O", "CO2", "O2", "H2SO4"],
                    correct_answer: 0,
                    explanation: "Вода: два атома водорода и один кислорода",
                },
            ],
        },
    },
];
